//! Shared fixtures for ledger tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tel_crypto::{EventSigner, LocalSigner, Signature, SignerError, VerifyingKey};
use tel_store::InMemoryEntryStore;
use tel_types::{Actor, Digest, EventDraft, EventType, LedgerEntry, Resource, Severity, Timestamp};

use crate::clock::ManualClock;
use crate::ledger::AuditLedger;

pub(crate) const T0: Timestamp = Timestamp(1_700_000_000_000);

/// Odd drafts come from `user-1`, even ones from `user-0`.
pub(crate) fn draft(i: u64) -> EventDraft {
    EventDraft::new(
        EventType::DataAccess,
        Severity::Medium,
        Actor::user(format!("user-{}", i % 2)),
        Resource::new("document", format!("doc-{i}")),
        "read",
    )
    .with_detail("bytes", i * 128)
}

pub(crate) fn memory_ledger() -> (AuditLedger, Arc<InMemoryEntryStore>) {
    let store = Arc::new(InMemoryEntryStore::new());
    let ledger = AuditLedger::builder(store.clone(), Arc::new(LocalSigner::generate()))
        .clock(Arc::new(ManualClock::new(T0)))
        .open()
        .expect("open in-memory ledger");
    (ledger, store)
}

/// Rewrite one record of an entry log in place, with a freshly computed
/// CRC, the way an attacker with write access to the file would.
pub(crate) fn rewrite_wal_record(path: &Path, sequence: u64, mutate: impl FnOnce(&mut LedgerEntry)) {
    let bytes = std::fs::read(path).unwrap();
    let mut out = Vec::with_capacity(bytes.len());
    let mut mutate = Some(mutate);
    let mut offset = 0usize;
    let mut index = 0u64;
    while offset < bytes.len() {
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        let payload = &bytes[offset + 8..offset + 8 + len];
        if index == sequence {
            let mut entry: LedgerEntry = serde_json::from_slice(payload).unwrap();
            (mutate.take().unwrap())(&mut entry);
            let payload = serde_json::to_vec(&entry).unwrap();
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
            out.extend_from_slice(&payload);
        } else {
            out.extend_from_slice(&bytes[offset..offset + 8 + len]);
        }
        offset += 8 + len;
        index += 1;
    }
    assert!(mutate.is_none(), "no record {sequence} in {}", path.display());
    std::fs::write(path, out).unwrap();
}

/// Signer that can be switched off or slowed down.
pub(crate) struct FlakySigner {
    inner: LocalSigner,
    delay: Option<Duration>,
    pub available: AtomicBool,
    pub calls: AtomicUsize,
}

impl FlakySigner {
    pub fn new() -> Self {
        Self {
            inner: LocalSigner::generate(),
            delay: None,
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }
}

#[async_trait]
impl EventSigner for FlakySigner {
    async fn sign(&self, digest: &Digest) -> Result<Signature, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(SignerError::Unavailable("hsm offline".into()));
        }
        self.inner.sign(digest).await
    }

    fn verifying_key(&self) -> VerifyingKey {
        self.inner.verifying_key()
    }
}
