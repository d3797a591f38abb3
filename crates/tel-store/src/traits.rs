use tel_types::LedgerEntry;

use crate::error::StoreResult;

/// Authoritative, append-only storage of ledger entries.
///
/// All implementations must satisfy these invariants:
/// - Entries are stored densely: entry `n` sits at sequence `n`.
/// - `append` rejects any entry whose sequence is not the current length.
/// - An entry is durable by the time `append` returns `Ok`.
/// - Nothing is ever removed or rewritten through this trait.
/// - All I/O errors are propagated, never silently ignored.
pub trait EntryStore: Send + Sync {
    /// Persist `entry` at the tail.
    fn append(&self, entry: &LedgerEntry) -> StoreResult<()>;

    /// Read one entry. `Ok(None)` past the tail.
    fn get(&self, sequence: u64) -> StoreResult<Option<LedgerEntry>>;

    /// Read entries `start..=end`, clamped to the tail.
    fn read_range(&self, start: u64, end: u64) -> StoreResult<Vec<LedgerEntry>>;

    /// Number of stored entries.
    fn len(&self) -> StoreResult<u64>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// The tail entry, if any.
    fn last(&self) -> StoreResult<Option<LedgerEntry>> {
        match self.len()? {
            0 => Ok(None),
            n => self.get(n - 1),
        }
    }
}
