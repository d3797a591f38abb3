use std::sync::RwLock;

use tel_types::LedgerEntry;

use crate::error::{StoreError, StoreResult};
use crate::traits::EntryStore;

/// In-memory, `Vec`-backed entry store.
///
/// Intended for tests and embedding. Entries are held behind a `RwLock` and
/// cloned on read.
pub struct InMemoryEntryStore {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Mutate a stored entry in place, bypassing the append-only contract.
    ///
    /// This simulates an attacker with write access to the storage medium.
    /// Returns `false` if `sequence` is past the tail.
    pub fn rewrite(&self, sequence: u64, mutate: impl FnOnce(&mut LedgerEntry)) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        match usize::try_from(sequence).ok().and_then(|i| entries.get_mut(i)) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn append(&self, entry: &LedgerEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let expected = entries.len() as u64;
        if entry.sequence_number != expected {
            return Err(StoreError::SequenceGap {
                expected,
                found: entry.sequence_number,
            });
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn get(&self, sequence: u64) -> StoreResult<Option<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(usize::try_from(sequence)
            .ok()
            .and_then(|i| entries.get(i))
            .cloned())
    }

    fn read_range(&self, start: u64, end: u64) -> StoreResult<Vec<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let len = entries.len() as u64;
        if start >= len || start > end {
            return Ok(Vec::new());
        }
        let end = end.min(len - 1);
        Ok(entries[start as usize..=end as usize].to_vec())
    }

    fn len(&self) -> StoreResult<u64> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.len() as u64)
    }
}

impl std::fmt::Debug for InMemoryEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryEntryStore")
            .field("entry_count", &count)
            .finish()
    }
}
