use std::fs;
use std::path::Path;

use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition};
use tracing::debug;

use crate::error::{KvError, KvResult};

const TABLE: TableDefinition<&[u8], Vec<u8>> = TableDefinition::new("keyspace");

/// File name of the database inside the store directory.
pub const KEYSPACE_FILE: &str = "stash.redb";

/// An open keyspace. Clone-free; share behind `Arc`.
pub struct Keyspace {
    db: Database,
}

impl Keyspace {
    /// Open (or create) the keyspace under `dir`.
    ///
    /// Creates the directory if needed. redb takes an exclusive lock on the
    /// database file, so this fails while another process has the same
    /// store open.
    pub fn open(dir: &Path) -> KvResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(KEYSPACE_FILE);
        let db = Database::create(&path)?;
        let txn = db.begin_write()?;
        txn.open_table(TABLE)?;
        txn.commit()?;
        debug!(path = %path.display(), "keyspace open");
        Ok(Self { db })
    }

    /// Take a consistent read view of the keyspace.
    ///
    /// Snapshots are MVCC: they observe the last committed state and are
    /// unaffected by writers that commit afterwards.
    pub fn snapshot(&self) -> KvResult<Snapshot> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLE)?;
        Ok(Snapshot { _txn: txn, table })
    }

    /// Run `f` inside a write transaction and commit.
    ///
    /// If `f` returns an error the transaction is aborted and nothing it
    /// wrote becomes visible. Writers are serialized by redb.
    pub fn write<T>(&self, f: impl FnOnce(&mut WriteAccess<'_>) -> KvResult<T>) -> KvResult<T> {
        self.write_with(f)
    }

    /// Like [`write`](Self::write) for callers whose closures fail with
    /// their own error type.
    pub fn write_with<T, E>(
        &self,
        f: impl FnOnce(&mut WriteAccess<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<KvError>,
    {
        let txn = self.db.begin_write().map_err(KvError::from)?;
        let out = {
            let table = txn.open_table(TABLE).map_err(KvError::from)?;
            let mut access = WriteAccess { table };
            f(&mut access)
        };
        match out {
            Ok(value) => {
                txn.commit().map_err(KvError::from)?;
                Ok(value)
            }
            Err(err) => {
                // The closure error is the one worth reporting.
                let _ = txn.abort();
                Err(err)
            }
        }
    }
}

/// Consistent read view over the whole keyspace.
pub struct Snapshot {
    _txn: ReadTransaction,
    table: ReadOnlyTable<&'static [u8], Vec<u8>>,
}

impl Snapshot {
    /// Fetch a single value.
    pub fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.table.get(key)?.map(|guard| guard.value()))
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        match prefix_end(prefix) {
            Some(end) => {
                for item in self.table.range::<&[u8]>(prefix..end.as_slice())? {
                    let (key, value) = item?;
                    out.push((key.value().to_vec(), value.value()));
                }
            }
            None => {
                for item in self.table.range::<&[u8]>(prefix..)? {
                    let (key, value) = item?;
                    out.push((key.value().to_vec(), value.value()));
                }
            }
        }
        Ok(out)
    }

    /// Like [`scan_prefix`](Self::scan_prefix) but in descending key order,
    /// stopping after `limit` entries. A `limit` of zero returns everything.
    pub fn scan_prefix_rev(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cap = if limit == 0 { usize::MAX } else { limit };
        let mut out = Vec::new();
        match prefix_end(prefix) {
            Some(end) => {
                for item in self.table.range::<&[u8]>(prefix..end.as_slice())?.rev() {
                    let (key, value) = item?;
                    out.push((key.value().to_vec(), value.value()));
                    if out.len() == cap {
                        break;
                    }
                }
            }
            None => {
                for item in self.table.range::<&[u8]>(prefix..)?.rev() {
                    let (key, value) = item?;
                    out.push((key.value().to_vec(), value.value()));
                    if out.len() == cap {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Mutation handle available inside [`Keyspace::write`] closures.
pub struct WriteAccess<'txn> {
    table: Table<'txn, &'static [u8], Vec<u8>>,
}

impl WriteAccess<'_> {
    /// Read a value through the uncommitted transaction state.
    pub fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.table.get(key)?.map(|guard| guard.value()))
    }

    /// Insert or overwrite a value.
    pub fn put(&mut self, key: &[u8], value: Vec<u8>) -> KvResult<()> {
        self.table.insert(key, value)?;
        Ok(())
    }

    /// Remove a key, reporting whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> KvResult<bool> {
        Ok(self.table.remove(key)?.is_some())
    }
}

/// Smallest key strictly greater than every key with the given prefix, or
/// `None` when no such bound exists (all-0xFF prefixes).
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}
