use serde::{Deserialize, Serialize};
use tel_crypto::{verify_digest, BreakReason, ChainChecker, KeyResolver, MerkleState, Signature};
use tel_store::EntryStore;
use tel_types::{Digest, LedgerEntry};
use tracing::{debug, warn};

use crate::error::LedgerError;

/// One integrity problem found during verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// The entry does not chain correctly to its predecessor or its own
    /// fields.
    ChainBreak { sequence: u64, reason: BreakReason },
    /// No key was effective at the entry's timestamp, or the signature over
    /// its digest does not verify.
    SignatureInvalid { sequence: u64 },
    /// The root stored with an entry (or the live root, at the tail) differs
    /// from the root replayed from recomputed digests.
    RootMismatch {
        sequence: u64,
        stored: Digest,
        computed: Digest,
    },
}

impl Finding {
    pub fn sequence(&self) -> u64 {
        match self {
            Self::ChainBreak { sequence, .. }
            | Self::SignatureInvalid { sequence }
            | Self::RootMismatch { sequence, .. } => *sequence,
        }
    }
}

/// Outcome of replaying a range of the ledger.
///
/// Contains no wall-clock data: verifying an unchanged ledger twice yields
/// equal reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub start: u64,
    pub end: u64,
    pub checked_count: u64,
    pub first_broken_sequence: Option<u64>,
    pub broken_checks: Vec<Finding>,
    /// Root replayed from recomputed digests of entries `0..=end`.
    pub root_digest: Digest,
}

impl VerificationReport {
    /// Report for a ledger with nothing in it.
    pub fn empty() -> Self {
        Self {
            valid: true,
            start: 0,
            end: 0,
            checked_count: 0,
            first_broken_sequence: None,
            broken_checks: Vec::new(),
            root_digest: Digest::zero(),
        }
    }
}

/// Parameters of one verification pass over `start..=end`.
pub(crate) struct VerifyPass<'a> {
    pub store: &'a dyn EntryStore,
    pub keys: &'a dyn KeyResolver,
    pub start: u64,
    pub end: u64,
    /// Live accumulator root, supplied only when `end` is the ledger tail.
    pub live_root: Option<Digest>,
    pub batch: u64,
}

impl VerifyPass<'_> {
    /// Walk `0..=end`, replaying every leaf and reporting on `start..=end`.
    pub(crate) async fn run(self) -> Result<VerificationReport, LedgerError> {
        let mut checker = ChainChecker::new();
        let mut accumulator = MerkleState::new();
        let mut findings = Vec::new();
        let mut position = 0u64;

        while position <= self.end {
            let page_end = position
                .saturating_add(self.batch - 1)
                .min(self.end);
            let page = self.store.read_range(position, page_end)?;
            if page.len() as u64 != page_end - position + 1 {
                return Err(LedgerError::EntryMissing {
                    sequence: position + page.len() as u64,
                });
            }

            for entry in &page {
                let check = checker.check(entry);
                let root = accumulator.extend(check.recomputed);
                if position >= self.start {
                    findings.extend(
                        check
                            .faults
                            .into_iter()
                            .map(|reason| Finding::ChainBreak { sequence: position, reason }),
                    );
                    if !self.signature_holds(entry) {
                        findings.push(Finding::SignatureInvalid { sequence: position });
                    }
                    if entry.merkle_root != root {
                        findings.push(Finding::RootMismatch {
                            sequence: position,
                            stored: entry.merkle_root,
                            computed: root,
                        });
                    }
                }
                position += 1;
            }

            // Cancellation point between batches.
            tokio::task::yield_now().await;
        }

        let computed_root = accumulator.root();
        if let Some(live) = self.live_root {
            let already_reported = findings.iter().any(
                |f| matches!(f, Finding::RootMismatch { sequence, .. } if *sequence == self.end),
            );
            if live != computed_root && !already_reported {
                findings.push(Finding::RootMismatch {
                    sequence: self.end,
                    stored: live,
                    computed: computed_root,
                });
            }
        }

        let first_broken_sequence = findings.iter().map(Finding::sequence).min();
        if let Some(first) = first_broken_sequence {
            warn!(
                start = self.start,
                end = self.end,
                first_broken = first,
                findings = findings.len(),
                "ledger verification found integrity breaks"
            );
        } else {
            debug!(start = self.start, end = self.end, "ledger verification passed");
        }

        Ok(VerificationReport {
            valid: findings.is_empty(),
            start: self.start,
            end: self.end,
            checked_count: self.end - self.start + 1,
            first_broken_sequence,
            broken_checks: findings,
            root_digest: computed_root,
        })
    }

    fn signature_holds(&self, entry: &LedgerEntry) -> bool {
        let signature = Signature::from(entry.event.signature);
        self.keys
            .key_at(entry.event.timestamp)
            .is_some_and(|key| verify_digest(&entry.current_digest(), &signature, &key))
    }
}
