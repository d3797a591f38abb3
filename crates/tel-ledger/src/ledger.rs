use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tel_crypto::{link_digest, EventSigner, KeyRing, MerkleProof, MerkleState, MerkleTree, VerifyingKey};
use tel_store::{AnchorSink, EntryStore, StoreError};
use tel_types::{
    canonical_event_bytes, AuditEvent, Digest, EventDraft, EventId, LedgerEntry, Timestamp,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::export::{AnchorReceipt, ExportBundle};
use crate::query::{QueryFilter, QueryIter};
use crate::verify::{VerificationReport, VerifyPass};

/// Published summary of the ledger, replaced as a unit after each append.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHead {
    pub len: u64,
    pub merkle_root: Digest,
    pub tail_digest: Digest,
}

/// Everything an append reads and advances. Owned by the append critical
/// section; nothing else mutates it.
struct TailState {
    next_sequence: u64,
    tail_digest: Digest,
    /// Lowest timestamp the next append may carry.
    floor: Timestamp,
    frontier: MerkleState,
    signer: Arc<dyn EventSigner>,
}

struct LedgerInner {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    tail: Mutex<TailState>,
    head: RwLock<LedgerHead>,
    keys: RwLock<KeyRing>,
}

/// Handle to one tamper-evident audit ledger.
///
/// Cloning is cheap and every clone addresses the same ledger. Appends are
/// linearized through a single critical section; reads (`head`, `verify`,
/// `query`, `export`) never take it and observe the ledger as of the last
/// completed append.
#[derive(Clone)]
pub struct AuditLedger {
    inner: Arc<LedgerInner>,
}

/// Configures and opens an [`AuditLedger`].
pub struct LedgerBuilder {
    store: Arc<dyn EntryStore>,
    signer: Arc<dyn EventSigner>,
    keys: Option<KeyRing>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl LedgerBuilder {
    /// Historical verifying keys. Required to verify entries written before
    /// the current signer took over.
    pub fn key_ring(mut self, keys: KeyRing) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// Rebuild tail state from the store and open the ledger.
    pub fn open(self) -> Result<AuditLedger, LedgerError> {
        let len = self.store.len()?;
        let page = self.config.page_size();

        let mut frontier = MerkleState::new();
        let mut tail_digest = Digest::zero();
        let mut floor = Timestamp::zero();
        let mut last_root = Digest::zero();
        let mut position = 0u64;
        while position < len {
            let end = position.saturating_add(page - 1).min(len - 1);
            let entries = self.store.read_range(position, end)?;
            if entries.is_empty() {
                return Err(LedgerError::EntryMissing { sequence: position });
            }
            for entry in &entries {
                frontier.extend(entry.current_digest());
                tail_digest = entry.current_digest();
                floor = floor.max(entry.event.timestamp);
                last_root = entry.merkle_root;
            }
            position += entries.len() as u64;
        }
        if frontier.root() != last_root {
            warn!(
                stored = %last_root.short_hex(),
                rebuilt = %frontier.root().short_hex(),
                "stored tail root disagrees with rebuilt accumulator; run verification"
            );
        }

        let has_entries = len > 0;
        let supplied_history = self.keys.is_some();
        let mut keys = self.keys.unwrap_or_default();
        if has_entries && !supplied_history {
            warn!(entries = len, "opening non-empty ledger without key history");
        }
        let key = self.signer.verifying_key();
        let floor = register_key(&mut keys, &key, floor, has_entries, self.clock.now());

        let head = LedgerHead {
            len,
            merkle_root: frontier.root(),
            tail_digest,
        };
        info!(
            entries = len,
            root = %head.merkle_root.short_hex(),
            key_id = %key.key_id(),
            "opened audit ledger"
        );

        Ok(AuditLedger {
            inner: Arc::new(LedgerInner {
                store: self.store,
                clock: self.clock,
                config: self.config,
                tail: Mutex::new(TailState {
                    next_sequence: len,
                    tail_digest,
                    floor,
                    frontier,
                    signer: self.signer,
                }),
                head: RwLock::new(head),
                keys: RwLock::new(keys),
            }),
        })
    }
}

/// Make `key` the effective key for all future appends and return the new
/// timestamp floor.
///
/// The key takes effect strictly after every timestamp already written, so
/// existing entries keep resolving to the key that signed them.
fn register_key(
    keys: &mut KeyRing,
    key: &VerifyingKey,
    floor: Timestamp,
    has_entries: bool,
    now: Timestamp,
) -> Timestamp {
    let latest = keys
        .latest()
        .map(|epoch| (epoch.effective_from, &epoch.key == key));
    match latest {
        None => {
            keys.insert(Timestamp::zero(), key.clone());
            floor
        }
        Some((effective_from, true)) => floor.max(effective_from),
        Some((effective_from, false)) => {
            let mut effective = now.max(effective_from.successor());
            if has_entries {
                effective = effective.max(floor.successor());
            }
            keys.insert(effective, key.clone());
            effective
        }
    }
}

impl LedgerInner {
    fn head(&self) -> LedgerHead {
        *read_lock(&self.head)
    }

    fn conflict(expected: u64, actual: u64) -> LedgerError {
        error!(
            expected,
            actual,
            "append serialization point violated: store length disagrees with ledger tail"
        );
        LedgerError::ConcurrentAppendConflict { expected, actual }
    }

    async fn append(&self, draft: EventDraft) -> Result<LedgerEntry, LedgerError> {
        let mut tail = self.tail.lock().await;
        let sequence = tail.next_sequence;

        let timestamp = self.clock.now().max(tail.floor);
        let event = AuditEvent::unsealed(EventId::new(), timestamp, draft);
        let canonical = canonical_event_bytes(&event)?;
        let previous = tail.tail_digest;
        let current = link_digest(&canonical, &previous);

        let signature = match tokio::time::timeout(
            self.config.sign_timeout(),
            tail.signer.sign(&current),
        )
        .await
        {
            Ok(Ok(signature)) => signature,
            Ok(Err(err)) => {
                warn!(sequence, error = %err, "signer failed; append aborted");
                return Err(LedgerError::SigningUnavailable(err.to_string()));
            }
            Err(_) => {
                warn!(
                    sequence,
                    timeout_ms = self.config.sign_timeout_ms,
                    "signer timed out; append aborted"
                );
                return Err(LedgerError::SigningUnavailable(format!(
                    "signer did not respond within {} ms",
                    self.config.sign_timeout_ms
                )));
            }
        };

        let mut frontier = tail.frontier.clone();
        let merkle_root = frontier.extend(current);
        let entry = LedgerEntry {
            sequence_number: sequence,
            leaf_index: sequence,
            event: event.seal(previous, current, signature.into()),
            merkle_root,
        };

        let stored = self.store.len()?;
        if stored != sequence {
            return Err(Self::conflict(sequence, stored));
        }
        self.persist(entry.clone()).await?;

        tail.next_sequence = sequence + 1;
        tail.tail_digest = current;
        tail.floor = timestamp;
        tail.frontier = frontier;
        *write_lock(&self.head) = LedgerHead {
            len: sequence + 1,
            merkle_root,
            tail_digest: current,
        };

        debug!(
            sequence,
            event_id = %entry.event.event_id,
            digest = %current.short_hex(),
            root = %merkle_root.short_hex(),
            "appended event"
        );
        Ok(entry)
    }

    async fn persist(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let store = Arc::clone(&self.store);
        let sequence = entry.sequence_number;
        let result = tokio::task::spawn_blocking(move || store.append(&entry))
            .await
            .map_err(|e| LedgerError::TaskFailed(e.to_string()))?;
        match result {
            Ok(()) => Ok(()),
            Err(StoreError::SequenceGap { expected, .. }) => Err(Self::conflict(sequence, expected)),
            Err(e) => Err(e.into()),
        }
    }
}

impl AuditLedger {
    pub fn builder(store: Arc<dyn EntryStore>, signer: Arc<dyn EventSigner>) -> LedgerBuilder {
        LedgerBuilder {
            store,
            signer,
            keys: None,
            clock: Arc::new(SystemClock),
            config: LedgerConfig::default(),
        }
    }

    /// Append one event.
    ///
    /// Stamps identity, time and chain linkage, signs, persists, and advances
    /// the Merkle accumulator as one atomic step. On any error the ledger is
    /// exactly as it was before the call. The work runs on its own task, so
    /// dropping the returned future does not abandon an append midway.
    pub async fn append(&self, draft: EventDraft) -> Result<LedgerEntry, LedgerError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.append(draft).await })
            .await
            .map_err(|e| LedgerError::TaskFailed(e.to_string()))?
    }

    /// Switch to a new signer. Returns the timestamp from which its key is
    /// effective; every later append carries a timestamp at or after it.
    pub async fn rotate_signer(&self, signer: Arc<dyn EventSigner>) -> Timestamp {
        let mut tail = self.inner.tail.lock().await;
        let key = signer.verifying_key();
        let effective = {
            let mut keys = write_lock(&self.inner.keys);
            register_key(
                &mut keys,
                &key,
                tail.floor,
                tail.next_sequence > 0,
                self.inner.clock.now(),
            )
        };
        tail.floor = effective;
        tail.signer = signer;
        info!(key_id = %key.key_id(), effective_from = %effective, "rotated signing key");
        effective
    }

    pub fn head(&self) -> LedgerHead {
        self.inner.head()
    }

    pub fn len(&self) -> u64 {
        self.head().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn merkle_root(&self) -> Digest {
        self.head().merkle_root
    }

    /// Snapshot of the verifying-key history.
    pub fn key_ring(&self) -> KeyRing {
        read_lock(&self.inner.keys).clone()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    /// Read one committed entry.
    pub fn get(&self, sequence: u64) -> Result<Option<LedgerEntry>, LedgerError> {
        if sequence >= self.len() {
            return Ok(None);
        }
        Ok(self.inner.store.get(sequence)?)
    }

    /// Replay `start..=end` (defaults: whole ledger) and report every
    /// integrity problem found. `end` is clamped to the tail.
    pub async fn verify(
        &self,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<VerificationReport, LedgerError> {
        let head = self.head();
        if head.len == 0 {
            return match (start, end) {
                (None, None) => Ok(VerificationReport::empty()),
                (s, e) => Err(LedgerError::InvalidRange {
                    start: s.unwrap_or(0),
                    end: e.unwrap_or(0),
                    len: 0,
                }),
            };
        }

        let tail = head.len - 1;
        let start = start.unwrap_or(0);
        let requested_end = end.unwrap_or(tail);
        let end = requested_end.min(tail);
        if start > end {
            return Err(LedgerError::InvalidRange {
                start,
                end: requested_end,
                len: head.len,
            });
        }

        let keys = self.key_ring();
        VerifyPass {
            store: self.inner.store.as_ref(),
            keys: &keys,
            start,
            end,
            live_root: (end == tail).then_some(head.merkle_root),
            batch: self.inner.config.verify_batch(),
        }
        .run()
        .await
    }

    /// Lazily iterate entries matching `filter`, as of now.
    pub fn query(&self, filter: QueryFilter) -> QueryIter {
        QueryIter::new(
            Arc::clone(&self.inner.store),
            filter,
            self.len(),
            self.inner.config.page_size(),
        )
    }

    /// Collect up to `limit` matching entries.
    pub fn search(
        &self,
        filter: QueryFilter,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query(filter)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Verify `start..=end` and package it with its report.
    ///
    /// A range that fails verification is still exported, with `valid`
    /// false; whether to anchor it is the caller's decision.
    pub async fn export(
        &self,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<ExportBundle, LedgerError> {
        let report = self.verify(start, end).await?;
        let entries = if report.checked_count == 0 {
            Vec::new()
        } else {
            self.inner.store.read_range(report.start, report.end)?
        };
        if entries.len() as u64 != report.checked_count {
            return Err(LedgerError::EntryMissing {
                sequence: report.start + entries.len() as u64,
            });
        }

        let merkle_root = entries.last().map_or(Digest::zero(), |e| e.merkle_root);
        if !report.valid {
            warn!(
                first_broken = ?report.first_broken_sequence,
                findings = report.broken_checks.len(),
                "exporting range that failed verification"
            );
        }
        info!(
            start = report.start,
            end = report.end,
            entries = entries.len(),
            valid = report.valid,
            "exported ledger snapshot"
        );

        Ok(ExportBundle {
            entries,
            merkle_root,
            valid: report.valid,
            verification_report: report,
            export_timestamp: self.inner.clock.now(),
        })
    }

    /// Publish `bundle` to an external anchor sink.
    pub async fn anchor(
        &self,
        bundle: &ExportBundle,
        sink: &dyn AnchorSink,
    ) -> Result<AnchorReceipt, LedgerError> {
        let bytes = bundle.to_bytes()?;
        let content_id = sink.put(&bytes).await?;
        info!(
            content_id = %content_id,
            entries = bundle.entries.len(),
            valid = bundle.valid,
            "anchored export bundle"
        );
        Ok(AnchorReceipt::for_bundle(content_id, bundle))
    }

    /// Inclusion proof of entry `sequence` against the current root.
    pub fn prove(&self, sequence: u64) -> Result<MerkleProof, LedgerError> {
        let head = self.head();
        if sequence >= head.len {
            return Err(LedgerError::InvalidRange {
                start: sequence,
                end: sequence,
                len: head.len,
            });
        }
        let page = self.inner.config.page_size();
        let mut leaves = Vec::with_capacity(head.len as usize);
        while (leaves.len() as u64) < head.len {
            let start = leaves.len() as u64;
            let end = start.saturating_add(page - 1).min(head.len - 1);
            let entries = self.inner.store.read_range(start, end)?;
            if entries.is_empty() {
                return Err(LedgerError::EntryMissing { sequence: start });
            }
            leaves.extend(entries.iter().map(LedgerEntry::current_digest));
        }
        MerkleTree::from_leaves(leaves)
            .proof(sequence as usize)
            .ok_or(LedgerError::EntryMissing { sequence })
    }
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("head", &self.head())
            .finish()
    }
}

// The guarded values are replaced whole, never left half-written, so a
// poisoned lock still holds a consistent value.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
