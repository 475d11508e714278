use thiserror::Error;

/// Errors from keyspace operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// The database file could not be created or opened. Also raised when
    /// another process holds the exclusive lock on the store.
    #[error("failed to open keyspace: {0}")]
    Open(#[from] redb::DatabaseError),

    /// A read or write transaction could not be started.
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// The backing table could not be opened.
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    /// A get, put, delete or range operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// A write transaction failed to commit.
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// I/O error outside the database proper (store directory creation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for keyspace operations.
pub type KvResult<T> = Result<T, KvError>;
