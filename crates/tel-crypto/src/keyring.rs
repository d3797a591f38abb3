use serde::{Deserialize, Serialize};
use tel_types::Timestamp;

use crate::signer::VerifyingKey;

/// Answers "which public key was in force at time T".
///
/// Entries do not embed their signing key, so verification asks a resolver
/// for the key effective at each entry's timestamp.
pub trait KeyResolver: Send + Sync {
    fn key_at(&self, at: Timestamp) -> Option<VerifyingKey>;
}

/// One key and the instant from which it signs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEpoch {
    pub effective_from: Timestamp,
    pub key: VerifyingKey,
}

/// Ordered history of verifying keys.
///
/// A key is effective from its `effective_from` (inclusive) until the next
/// epoch begins. Keys are never removed, so historical entries keep
/// verifying after a rotation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRing {
    epochs: Vec<KeyEpoch>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ring holding one key effective since the epoch.
    pub fn with_genesis(key: VerifyingKey) -> Self {
        let mut ring = Self::new();
        ring.insert(Timestamp::zero(), key);
        ring
    }

    /// Register `key` as effective from `effective_from`.
    ///
    /// An existing epoch with the same start is replaced.
    pub fn insert(&mut self, effective_from: Timestamp, key: VerifyingKey) {
        let pos = self
            .epochs
            .partition_point(|e| e.effective_from < effective_from);
        match self.epochs.get_mut(pos) {
            Some(epoch) if epoch.effective_from == effective_from => epoch.key = key,
            _ => self.epochs.insert(pos, KeyEpoch { effective_from, key }),
        }
    }

    /// The most recently effective key, if any.
    pub fn latest(&self) -> Option<&KeyEpoch> {
        self.epochs.last()
    }

    pub fn contains(&self, key: &VerifyingKey) -> bool {
        self.epochs.iter().any(|e| &e.key == key)
    }

    pub fn epochs(&self) -> &[KeyEpoch] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

impl KeyResolver for KeyRing {
    fn key_at(&self, at: Timestamp) -> Option<VerifyingKey> {
        let pos = self.epochs.partition_point(|e| e.effective_from <= at);
        pos.checked_sub(1).map(|i| self.epochs[i].key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SigningKey;

    fn key(seed: u8) -> VerifyingKey {
        SigningKey::from_bytes([seed; 32]).verifying_key()
    }

    #[test]
    fn empty_ring_resolves_nothing() {
        assert!(KeyRing::new().key_at(Timestamp(5)).is_none());
    }

    #[test]
    fn resolves_key_effective_at_time() {
        let mut ring = KeyRing::with_genesis(key(1));
        ring.insert(Timestamp(100), key(2));
        ring.insert(Timestamp(200), key(3));

        assert_eq!(ring.key_at(Timestamp(0)), Some(key(1)));
        assert_eq!(ring.key_at(Timestamp(99)), Some(key(1)));
        assert_eq!(ring.key_at(Timestamp(100)), Some(key(2)));
        assert_eq!(ring.key_at(Timestamp(199)), Some(key(2)));
        assert_eq!(ring.key_at(Timestamp(u64::MAX)), Some(key(3)));
    }

    #[test]
    fn key_before_first_epoch_is_none() {
        let mut ring = KeyRing::new();
        ring.insert(Timestamp(50), key(1));
        assert!(ring.key_at(Timestamp(49)).is_none());
        assert_eq!(ring.key_at(Timestamp(50)), Some(key(1)));
    }

    #[test]
    fn out_of_order_inserts_stay_sorted() {
        let mut ring = KeyRing::new();
        ring.insert(Timestamp(200), key(3));
        ring.insert(Timestamp(0), key(1));
        ring.insert(Timestamp(100), key(2));
        let starts: Vec<u64> = ring.epochs().iter().map(|e| e.effective_from.0).collect();
        assert_eq!(starts, vec![0, 100, 200]);
        assert_eq!(ring.latest().unwrap().key, key(3));
    }

    #[test]
    fn same_start_replaces_key() {
        let mut ring = KeyRing::with_genesis(key(1));
        ring.insert(Timestamp::zero(), key(2));
        assert_eq!(ring.len(), 1);
        assert!(ring.contains(&key(2)));
        assert!(!ring.contains(&key(1)));
    }

    #[test]
    fn serde_roundtrip() {
        let mut ring = KeyRing::with_genesis(key(1));
        ring.insert(Timestamp(10), key(2));
        let json = serde_json::to_string(&ring).unwrap();
        let parsed: KeyRing = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ring);
    }
}
