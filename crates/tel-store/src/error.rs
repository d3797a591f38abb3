/// Errors from entry stores and anchor sinks.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An append did not carry the next dense sequence number.
    #[error("out-of-order append: expected sequence {expected}, got {found}")]
    SequenceGap { expected: u64, found: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes fail their checksum or cannot be decoded.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// Another open store already holds the file.
    #[error("entry log {} is locked by another writer", .path.display())]
    Locked { path: std::path::PathBuf },

    /// A thread panicked while holding a store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
