use std::sync::Arc;

use async_trait::async_trait;
use tel_crypto::{EventSigner, LocalSigner, Signature, SignerError, SigningKey, VerifyingKey};
use tel_ledger::AuditLedger;
use tel_store::{InMemoryEntryStore, MemoryAnchorSink};
use tel_types::{Actor, Digest, EventDraft, EventType, Resource, Severity};

use crate::handler::AppState;

pub(crate) fn draft(action: &str) -> EventDraft {
    EventDraft::new(
        EventType::Authorization,
        Severity::High,
        Actor::service("billing"),
        Resource::new("account", "acct-42"),
        action,
    )
}

pub(crate) struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryEntryStore>,
    pub anchor: Arc<MemoryAnchorSink>,
}

pub(crate) fn memory_app() -> TestApp {
    app_with_signer(Arc::new(LocalSigner::generate()))
}

pub(crate) fn app_with_signer(signer: Arc<dyn EventSigner>) -> TestApp {
    let store = Arc::new(InMemoryEntryStore::new());
    let anchor = Arc::new(MemoryAnchorSink::new());
    let ledger = AuditLedger::builder(store.clone(), signer)
        .open()
        .expect("open in-memory ledger");
    TestApp {
        state: AppState {
            ledger,
            anchor: anchor.clone(),
        },
        store,
        anchor,
    }
}

/// Signer whose backend is unreachable.
pub(crate) struct OfflineSigner(VerifyingKey);

impl OfflineSigner {
    pub fn new() -> Self {
        Self(SigningKey::generate().verifying_key())
    }
}

#[async_trait]
impl EventSigner for OfflineSigner {
    async fn sign(&self, _digest: &Digest) -> Result<Signature, SignerError> {
        Err(SignerError::Unavailable("kms unreachable".into()))
    }

    fn verifying_key(&self) -> VerifyingKey {
        self.0.clone()
    }
}
