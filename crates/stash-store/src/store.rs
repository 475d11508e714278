use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use stash_kv::Keyspace;
use stash_types::{validate_name, Digest, HeadRecord, Metadata, Selector, CHUNK_SIZE};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::spool::{SealedSpool, Spool};

/// Policy knobs for a store.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreOptions {
    /// Reject zero-length payloads instead of recording tombstones.
    pub deny_empty: bool,
}

/// Facade over the keyspace implementing names, revisions and content.
///
/// All methods take `&self`; the keyspace serializes writers internally
/// and readers run on MVCC snapshots, so one instance behind an `Arc`
/// serves every connection of the daemon.
pub struct SecretStore {
    keyspace: Keyspace,
    options: StoreOptions,
    dir: PathBuf,
}

impl SecretStore {
    /// Open the store under `dir` with default options.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        Self::open_with(dir, StoreOptions::default())
    }

    /// Open the store under `dir` with explicit options.
    pub fn open_with(dir: &Path, options: StoreOptions) -> StoreResult<Self> {
        let keyspace = Keyspace::open(dir)?;
        Ok(Self {
            keyspace,
            options,
            dir: dir.to_path_buf(),
        })
    }

    /// Start a staging spool for a streamed write.
    pub fn spool(&self) -> StoreResult<Spool> {
        Ok(Spool::create_in(&self.dir)?)
    }

    /// Store `payload` as the next revision of `name`.
    pub fn set(&self, name: &str, payload: &[u8]) -> StoreResult<Metadata> {
        let mut spool = self.spool()?;
        spool.append(payload)?;
        self.commit_spool(name, spool.seal()?)
    }

    /// Commit a sealed spool as the next revision of `name`.
    ///
    /// One write transaction: allocate the revision from the per-name
    /// sequence, write the history record and time index entry, store the
    /// content chunks unless the digest is already present, and move the
    /// head pointer. Either all of it becomes visible or none of it.
    pub fn commit_spool(&self, name: &str, mut spool: SealedSpool) -> StoreResult<Metadata> {
        validate_name(name)?;
        if spool.length() == 0 && self.options.deny_empty {
            return Err(StoreError::Validation(
                "empty payload rejected by policy".into(),
            ));
        }

        let digest = spool.digest();
        let length = spool.length();
        let created_at = Utc::now();
        let nanos = created_at.timestamp_nanos_opt().unwrap_or(i64::MAX) as u64;

        let meta = self
            .keyspace
            .write_with(|w| -> Result<Metadata, StoreError> {
                let revision = match w.get(&keys::seq(name))? {
                    Some(bytes) => decode_seq(&bytes)? + 1,
                    None => 1,
                };
                let meta = Metadata {
                    name: name.to_string(),
                    revision,
                    digest,
                    length,
                    created_at,
                };
                let encoded = encode(&meta)?;

                if w.get(&keys::hash(&digest))?.is_none() {
                    let mut index: u32 = 0;
                    while let Some(chunk) = spool.next_chunk()? {
                        index += 1;
                        w.put(&keys::blob(&digest, index), chunk)?;
                    }
                    w.put(&keys::hash(&digest), encoded.clone())?;
                }

                w.put(&keys::hist(name, revision), encoded.clone())?;
                w.put(&keys::time(name, nanos, revision), encoded)?;
                w.put(
                    &keys::head(name),
                    encode(&HeadRecord { revision, digest })?,
                )?;
                w.put(&keys::seq(name), revision.to_be_bytes().to_vec())?;
                Ok(meta)
            })?;

        debug!(name, revision = meta.revision, digest = %digest, length, "revision committed");
        Ok(meta)
    }

    /// Resolve a name (and optional selector) to one revision's metadata
    /// without touching payload bytes.
    pub fn resolve(&self, name: &str, selector: Option<&Selector>) -> StoreResult<Metadata> {
        validate_name(name)?;
        let snap = self.keyspace.snapshot()?;
        match selector {
            None => {
                let head = match snap.get(&keys::head(name))? {
                    Some(bytes) => decode_head(&bytes)?,
                    None => return Err(StoreError::NotFound(name.to_string())),
                };
                match snap.get(&keys::hist(name, head.revision))? {
                    Some(bytes) => decode_meta(&bytes),
                    None => Err(StoreError::Corrupt(format!(
                        "head of {name} points at missing revision {}",
                        head.revision
                    ))),
                }
            }
            Some(Selector::Revision(revision)) => {
                match snap.get(&keys::hist(name, *revision))? {
                    Some(bytes) => decode_meta(&bytes),
                    None => Err(StoreError::NotFound(format!("{name} revision {revision}"))),
                }
            }
            Some(Selector::Digest(prefix)) => {
                // Ambiguity is judged over distinct digests; several
                // revisions of the same bytes resolve to the newest one.
                let mut newest: Option<Metadata> = None;
                let mut distinct: BTreeSet<Digest> = BTreeSet::new();
                for (_, value) in snap.scan_prefix(&keys::hist_prefix(name))? {
                    let meta = decode_meta(&value)?;
                    if meta.digest.matches_prefix(prefix) {
                        distinct.insert(meta.digest);
                        newest = Some(meta);
                    }
                }
                match (distinct.len(), newest) {
                    (0, _) => Err(StoreError::NotFound(format!("{name}@{prefix}"))),
                    (1, Some(meta)) => Ok(meta),
                    (count, _) => Err(StoreError::AmbiguousSelector {
                        name: name.to_string(),
                        selector: prefix.clone(),
                        count,
                    }),
                }
            }
        }
    }

    /// Fetch an entire payload, verifying length and digest.
    pub fn get(&self, name: &str, selector: Option<&Selector>) -> StoreResult<Vec<u8>> {
        let meta = self.resolve(name, selector)?;
        if meta.length == 0 {
            return Ok(Vec::new());
        }
        let snap = self.keyspace.snapshot()?;
        let count = meta.chunk_count(CHUNK_SIZE);
        let mut payload = Vec::with_capacity(meta.length as usize);
        for index in 1..=count {
            match snap.get(&keys::blob(&meta.digest, index))? {
                Some(chunk) => payload.extend_from_slice(&chunk),
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "chunk {index} of {} is missing",
                        meta.digest
                    )))
                }
            }
        }
        if payload.len() as u64 != meta.length {
            return Err(StoreError::Corrupt(format!(
                "payload of {} is {} bytes, expected {}",
                meta.digest,
                payload.len(),
                meta.length
            )));
        }
        let computed = Digest::of(&payload);
        if computed != meta.digest {
            return Err(StoreError::Corrupt(format!(
                "content hash mismatch: expected {}, computed {computed}",
                meta.digest
            )));
        }
        Ok(payload)
    }

    /// Fetch one stored chunk by digest and 1-based index.
    ///
    /// Streamed reads call this once per chunk so no transaction lives
    /// across a socket write; content is immutable, so chunks read under
    /// different snapshots still assemble to the original payload.
    pub fn read_chunk(&self, digest: &Digest, index: u32) -> StoreResult<Vec<u8>> {
        let snap = self.keyspace.snapshot()?;
        snap.get(&keys::blob(digest, index))?
            .ok_or_else(|| StoreError::NotFound(format!("chunk {index} of {digest}")))
    }

    /// Point the head of `name` back at an existing revision.
    ///
    /// No new revision is created and the sequence is not rewound, so a
    /// later set continues above the previous maximum. Reverting a deleted
    /// name restores it.
    pub fn revert(&self, name: &str, revision: u64) -> StoreResult<Metadata> {
        validate_name(name)?;
        let meta = self
            .keyspace
            .write_with(|w| -> Result<Metadata, StoreError> {
                let meta = match w.get(&keys::hist(name, revision))? {
                    Some(bytes) => decode_meta(&bytes)?,
                    None => {
                        return Err(StoreError::NotFound(format!("{name} revision {revision}")))
                    }
                };
                if w.get(&keys::hash(&meta.digest))?.is_none() {
                    return Err(StoreError::Corrupt(format!(
                        "content {} for revision {revision} is missing",
                        meta.digest
                    )));
                }
                w.put(
                    &keys::head(name),
                    encode(&HeadRecord {
                        revision,
                        digest: meta.digest,
                    })?,
                )?;
                Ok(meta)
            })?;
        debug!(name, revision, "head reverted");
        Ok(meta)
    }

    /// Remove the head pointer of `name`. History and content remain, and
    /// a missing name is not an error.
    pub fn delete(&self, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        let removed = self.keyspace.write(|w| w.delete(&keys::head(name)))?;
        if removed {
            debug!(name, "head removed");
        }
        Ok(removed)
    }

    /// All current heads in lexicographic name order.
    ///
    /// Tombstones (zero-length heads) are skipped unless asked for.
    pub fn list(&self, include_tombstones: bool) -> StoreResult<Vec<Metadata>> {
        let snap = self.keyspace.snapshot()?;
        let mut entries = Vec::new();
        for (key, value) in snap.scan_prefix(&keys::head_prefix())? {
            let Some(name) = keys::head_name(&key) else {
                return Err(StoreError::Corrupt("unparseable head key".into()));
            };
            let head = decode_head(&value)?;
            let meta = match snap.get(&keys::hist(&name, head.revision))? {
                Some(bytes) => decode_meta(&bytes)?,
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "head of {name} points at missing revision {}",
                        head.revision
                    )))
                }
            };
            if meta.is_tombstone() && !include_tombstones {
                continue;
            }
            entries.push(meta);
        }
        Ok(entries)
    }

    /// Revisions of `name`, newest first. A `limit` of zero means all.
    pub fn history(&self, name: &str, limit: usize) -> StoreResult<Vec<Metadata>> {
        validate_name(name)?;
        let snap = self.keyspace.snapshot()?;
        let rows = snap.scan_prefix_rev(&keys::hist_prefix(name), limit)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        rows.iter().map(|(_, value)| decode_meta(value)).collect()
    }

    /// Revisions of `name` ordered by creation time, newest first.
    ///
    /// Matches [`history`](Self::history) unless the clock stepped
    /// backwards between writes.
    pub fn history_by_time(&self, name: &str, limit: usize) -> StoreResult<Vec<Metadata>> {
        validate_name(name)?;
        let snap = self.keyspace.snapshot()?;
        let rows = snap.scan_prefix_rev(&keys::time_prefix(name), limit)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        rows.iter().map(|(_, value)| decode_meta(value)).collect()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_meta(bytes: &[u8]) -> StoreResult<Metadata> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(format!("metadata record: {e}")))
}

fn decode_head(bytes: &[u8]) -> StoreResult<HeadRecord> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(format!("head record: {e}")))
}

fn decode_seq(bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt("sequence record has wrong length".into()))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SecretStore) {
        let dir = TempDir::new().unwrap();
        let store = SecretStore::open(dir.path()).unwrap();
        (dir, store)
    }

    // ---- set / get ----

    #[test]
    fn set_then_get_roundtrip() {
        let (_dir, store) = open_temp();
        let meta = store.set("github", b"hunter2").unwrap();
        assert_eq!(meta.revision, 1);
        assert_eq!(meta.length, 7);
        assert_eq!(store.get("github", None).unwrap(), b"hunter2");
    }

    #[test]
    fn multi_chunk_payload_roundtrips() {
        let (_dir, store) = open_temp();
        let payload: Vec<u8> = (0..CHUNK_SIZE * 2 + 300)
            .map(|i| (i % 251) as u8)
            .collect();
        store.set("big", &payload).unwrap();
        assert_eq!(store.get("big", None).unwrap(), payload);
    }

    #[test]
    fn ten_chunk_payload_roundtrips() {
        let (_dir, store) = open_temp();
        let payload: Vec<u8> = (0..CHUNK_SIZE * 10).map(|i| (i % 249) as u8).collect();
        let meta = store.set("huge", &payload).unwrap();
        assert_eq!(meta.length, payload.len() as u64);
        assert_eq!(meta.chunk_count(CHUNK_SIZE), 10);
        assert_eq!(store.get("huge", None).unwrap(), payload);
    }

    #[test]
    fn streamed_commit_matches_one_shot_set() {
        let (_dir, store) = open_temp();
        let payload = vec![0x5au8; 300_000];

        store.set("oneshot", &payload).unwrap();
        let mut spool = store.spool().unwrap();
        for piece in payload.chunks(9_999) {
            spool.append(piece).unwrap();
        }
        let streamed = store.commit_spool("streamed", spool.seal().unwrap()).unwrap();

        let oneshot = store.resolve("oneshot", None).unwrap();
        assert_eq!(streamed.digest, oneshot.digest);
        assert_eq!(store.get("streamed", None).unwrap(), payload);
    }

    #[test]
    fn get_of_missing_name_is_not_found() {
        let (_dir, store) = open_temp();
        assert!(matches!(
            store.get("nope", None),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let (_dir, store) = open_temp();
        assert!(matches!(
            store.set("", b"x"),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.set("a\0b", b"x"),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.get("", None),
            Err(StoreError::Validation(_))
        ));
    }

    // ---- revisions & history ----

    #[test]
    fn revisions_increase_monotonically() {
        let (_dir, store) = open_temp();
        assert_eq!(store.set("n", b"v1").unwrap().revision, 1);
        assert_eq!(store.set("n", b"v2").unwrap().revision, 2);
        assert_eq!(store.set("n", b"v3").unwrap().revision, 3);

        let hist = store.history("n", 0).unwrap();
        let revs: Vec<u64> = hist.iter().map(|m| m.revision).collect();
        assert_eq!(revs, vec![3, 2, 1]);
    }

    #[test]
    fn history_respects_limit() {
        let (_dir, store) = open_temp();
        for i in 0..5 {
            store.set("n", format!("v{i}").as_bytes()).unwrap();
        }
        let hist = store.history("n", 2).unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].revision, 5);
        assert_eq!(hist[1].revision, 4);
    }

    #[test]
    fn history_of_unknown_name_is_not_found() {
        let (_dir, store) = open_temp();
        assert!(matches!(
            store.history("ghost", 0),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.history_by_time("ghost", 0),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn history_by_time_matches_revision_order() {
        let (_dir, store) = open_temp();
        for i in 0..4 {
            store.set("n", format!("v{i}").as_bytes()).unwrap();
        }
        let by_rev = store.history("n", 0).unwrap();
        let by_time = store.history_by_time("n", 0).unwrap();
        assert_eq!(by_rev, by_time);
    }

    #[test]
    fn old_revisions_stay_retrievable() {
        let (_dir, store) = open_temp();
        store.set("n", b"old").unwrap();
        store.set("n", b"new").unwrap();
        assert_eq!(store.get("n", None).unwrap(), b"new");
        assert_eq!(
            store.get("n", Some(&Selector::Revision(1))).unwrap(),
            b"old"
        );
    }

    // ---- selectors ----

    #[test]
    fn digest_prefix_selector_resolves_unique_match() {
        let (_dir, store) = open_temp();
        let meta = store.set("n", b"only").unwrap();
        store.set("other", b"unrelated").unwrap();

        let prefix = meta.digest.to_hex()[..7].to_string();
        let payload = store.get("n", Some(&Selector::Digest(prefix))).unwrap();
        assert_eq!(payload, b"only");
    }

    #[test]
    fn digest_selector_prefers_newest_of_equal_content() {
        let (_dir, store) = open_temp();
        let first = store.set("n", b"same").unwrap();
        store.set("n", b"different").unwrap();
        let third = store.set("n", b"same").unwrap();

        let resolved = store
            .resolve("n", Some(&Selector::Digest(first.digest.to_hex())))
            .unwrap();
        assert_eq!(resolved.revision, third.revision);
    }

    #[test]
    fn ambiguous_digest_prefix_is_reported() {
        let (_dir, store) = open_temp();
        store.set("n", b"one").unwrap();
        store.set("n", b"two").unwrap();

        // The empty prefix matches every digest in the history.
        let err = store
            .resolve("n", Some(&Selector::Digest(String::new())))
            .unwrap_err();
        match err {
            StoreError::AmbiguousSelector { count, .. } => assert_eq!(count, 2),
            other => panic!("expected ambiguous selector, got {other}"),
        }
    }

    #[test]
    fn unmatched_digest_prefix_is_not_found() {
        let (_dir, store) = open_temp();
        store.set("n", b"payload").unwrap();
        let err = store
            .resolve("n", Some(&Selector::Digest("zzzz".into())))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn unknown_revision_selector_is_not_found() {
        let (_dir, store) = open_temp();
        store.set("n", b"v").unwrap();
        assert!(matches!(
            store.resolve("n", Some(&Selector::Revision(9))),
            Err(StoreError::NotFound(_))
        ));
    }

    // ---- dedup ----

    #[test]
    fn identical_content_stores_chunks_once() {
        let (_dir, store) = open_temp();
        let payload = vec![0xcdu8; CHUNK_SIZE + 10];
        let a = store.set("first", &payload).unwrap();
        let b = store.set("second", &payload).unwrap();
        assert_eq!(a.digest, b.digest);

        let snap = store.keyspace.snapshot().unwrap();
        let blobs = snap.scan_prefix(b"blob:").unwrap();
        assert_eq!(blobs.len(), 2, "expected exactly one stored copy");
        assert_eq!(store.get("second", None).unwrap(), payload);
    }

    // ---- delete & tombstones ----

    #[test]
    fn delete_removes_head_but_keeps_history() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        store.set("n", b"v2").unwrap();

        assert!(store.delete("n").unwrap());
        assert!(!store.delete("n").unwrap());

        assert!(matches!(
            store.get("n", None),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.history("n", 0).unwrap().len(), 2);
        assert_eq!(
            store.get("n", Some(&Selector::Revision(1))).unwrap(),
            b"v1"
        );
        assert!(store.list(true).unwrap().is_empty());
    }

    #[test]
    fn set_after_delete_continues_the_sequence() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        store.set("n", b"v2").unwrap();
        store.delete("n").unwrap();
        let meta = store.set("n", b"v3").unwrap();
        assert_eq!(meta.revision, 3);
    }

    #[test]
    fn empty_payload_records_a_tombstone() {
        let (_dir, store) = open_temp();
        store.set("n", b"visible").unwrap();
        store.set("n", b"").unwrap();

        assert!(store.list(false).unwrap().is_empty());
        let all = store.list(true).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_tombstone());

        assert_eq!(store.get("n", None).unwrap(), Vec::<u8>::new());
        assert_eq!(store.history("n", 0).unwrap().len(), 2);
    }

    #[test]
    fn deny_empty_policy_rejects_tombstones() {
        let dir = TempDir::new().unwrap();
        let store =
            SecretStore::open_with(dir.path(), StoreOptions { deny_empty: true }).unwrap();
        assert!(matches!(
            store.set("n", b""),
            Err(StoreError::Validation(_))
        ));
        store.set("n", b"fine").unwrap();
    }

    // ---- revert ----

    #[test]
    fn revert_restores_an_old_revision() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        store.set("n", b"v2").unwrap();

        let meta = store.revert("n", 1).unwrap();
        assert_eq!(meta.revision, 1);
        assert_eq!(store.get("n", None).unwrap(), b"v1");
        // History is untouched by the revert.
        assert_eq!(store.history("n", 0).unwrap().len(), 2);
    }

    #[test]
    fn set_after_revert_does_not_reuse_revisions() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        store.set("n", b"v2").unwrap();
        store.revert("n", 1).unwrap();
        let meta = store.set("n", b"v3").unwrap();
        assert_eq!(meta.revision, 3);
    }

    #[test]
    fn revert_to_unknown_revision_is_not_found() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        assert!(matches!(
            store.revert("n", 5),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn revert_restores_a_deleted_name() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        store.delete("n").unwrap();
        store.revert("n", 1).unwrap();
        assert_eq!(store.get("n", None).unwrap(), b"v1");
    }

    // ---- listing ----

    #[test]
    fn list_orders_names_lexicographically() {
        let (_dir, store) = open_temp();
        store.set("charlie", b"3").unwrap();
        store.set("alpha", b"1").unwrap();
        store.set("bravo", b"2").unwrap();

        let names: Vec<String> = store
            .list(false)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn list_reflects_only_heads() {
        let (_dir, store) = open_temp();
        store.set("n", b"v1").unwrap();
        store.set("n", b"v2").unwrap();
        let entries = store.list(false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision, 2);
    }

    // ---- chunk access ----

    #[test]
    fn read_chunk_streams_stored_content() {
        let (_dir, store) = open_temp();
        let payload: Vec<u8> = (0..CHUNK_SIZE + 123).map(|i| (i % 256) as u8).collect();
        let meta = store.set("n", &payload).unwrap();

        let mut assembled = Vec::new();
        for index in 1..=meta.chunk_count(CHUNK_SIZE) {
            assembled.extend(store.read_chunk(&meta.digest, index).unwrap());
        }
        assert_eq!(assembled, payload);

        assert!(matches!(
            store.read_chunk(&meta.digest, 99),
            Err(StoreError::NotFound(_))
        ));
    }

    // ---- chunk fidelity across sizes ----

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]
        #[test]
        fn proptest_roundtrip_across_chunk_boundaries(
            delta in -2i64..=2,
            chunks in 0u64..=2,
            seed in 0u8..=255,
        ) {
            let size = (chunks as i64 * CHUNK_SIZE as i64 + delta).max(0) as usize;
            let payload: Vec<u8> = (0..size)
                .map(|i| (i as u8).wrapping_add(seed))
                .collect();

            let dir = TempDir::new().unwrap();
            let store = SecretStore::open(dir.path()).unwrap();
            let meta = store.set("p", &payload).unwrap();
            prop_assert_eq!(meta.length, payload.len() as u64);
            prop_assert_eq!(store.get("p", None).unwrap(), payload);
        }
    }
}
