use tel_store::StoreError;
use tel_types::TypeError;

/// Errors produced by ledger operations.
///
/// Verification findings are not errors: they are reported as data in a
/// [`VerificationReport`](crate::VerificationReport). An `Err` from
/// verification means the ledger could not be checked at all.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The signer is unreachable, failing, or timed out. Nothing was
    /// persisted; the caller may retry.
    #[error("signing unavailable: {0}")]
    SigningUnavailable(String),

    /// Event fields cannot be put into canonical form.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store's length disagrees with the append critical section.
    /// Indicates a serialization bug or a second writer on the same store.
    #[error("concurrent append conflict: expected sequence {expected}, store holds {actual} entries")]
    ConcurrentAppendConflict { expected: u64, actual: u64 },

    #[error("invalid sequence range: start={start}, end={end}, ledger length={len}")]
    InvalidRange { start: u64, end: u64, len: u64 },

    /// The store reported fewer entries than its length promised.
    #[error("entry {sequence} missing from store")]
    EntryMissing { sequence: u64 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A background append or I/O task panicked or was aborted.
    #[error("ledger task failed: {0}")]
    TaskFailed(String),
}

impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl LedgerError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SigningUnavailable(_))
    }
}
