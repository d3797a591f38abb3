use serde::{Deserialize, Serialize};
use tel_types::{canonical_event_bytes, AuditEvent, Digest, LedgerEntry, TypeError};

use crate::hasher::ContentHasher;

/// Chain digest of an event: `H("tel-event-v1:" || canonical || previous)`.
pub fn link_digest(canonical: &[u8], previous: &Digest) -> Digest {
    ContentHasher::EVENT.hash_parts(&[canonical, previous.as_bytes()])
}

/// Recompute an event's digest from its stored fields and stored
/// `previous_digest`.
pub fn event_digest(event: &AuditEvent) -> Result<Digest, TypeError> {
    let canonical = canonical_event_bytes(event)?;
    Ok(link_digest(&canonical, &event.previous_digest))
}

/// Why an entry fails its chain checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// Sequence number is not the dense successor of the previous entry.
    SequenceMismatch,
    /// Leaf index differs from the sequence number.
    LeafIndexMismatch,
    /// Recomputed digest differs from the stored `current_digest`, or the
    /// stored fields no longer canonicalize.
    DigestMismatch,
    /// `previous_digest` differs from the predecessor's recomputed digest.
    LinkMismatch,
}

impl BreakReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequenceMismatch => "sequence_mismatch",
            Self::LeafIndexMismatch => "leaf_index_mismatch",
            Self::DigestMismatch => "digest_mismatch",
            Self::LinkMismatch => "link_mismatch",
        }
    }
}

impl std::fmt::Display for BreakReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one entry against its predecessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkCheck {
    /// Digest recomputed from the entry's fields. Falls back to the zero
    /// digest when the fields cannot be canonicalized, which guarantees the
    /// following link also fails.
    pub recomputed: Digest,
    pub faults: Vec<BreakReason>,
}

impl LinkCheck {
    pub fn is_intact(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Streaming hash-chain checker.
///
/// Feed entries in sequence order. Each entry's `previous_digest` is compared
/// against the *recomputed* digest of the entry before it, so a tampered
/// entry also breaks the link of its successor.
#[derive(Clone, Debug)]
pub struct ChainChecker {
    expected_sequence: u64,
    previous: Digest,
}

impl ChainChecker {
    /// Start at the genesis of a ledger.
    pub fn new() -> Self {
        Self::resume(0, Digest::zero())
    }

    /// Start mid-ledger, after an entry whose recomputed digest is `previous`.
    pub fn resume(expected_sequence: u64, previous: Digest) -> Self {
        Self {
            expected_sequence,
            previous,
        }
    }

    /// Check `entry` and advance.
    pub fn check(&mut self, entry: &LedgerEntry) -> LinkCheck {
        let mut faults = Vec::new();

        if entry.sequence_number != self.expected_sequence {
            faults.push(BreakReason::SequenceMismatch);
        }
        if entry.leaf_index != entry.sequence_number {
            faults.push(BreakReason::LeafIndexMismatch);
        }

        let recomputed = match event_digest(&entry.event) {
            Ok(digest) if digest == entry.current_digest() => digest,
            Ok(digest) => {
                faults.push(BreakReason::DigestMismatch);
                digest
            }
            Err(_) => {
                faults.push(BreakReason::DigestMismatch);
                Digest::zero()
            }
        };

        if entry.previous_digest() != self.previous {
            faults.push(BreakReason::LinkMismatch);
        }

        // Resync on the entry's own number so one gap is reported once.
        self.expected_sequence = entry.sequence_number.saturating_add(1);
        self.previous = recomputed;
        LinkCheck { recomputed, faults }
    }

    /// Recomputed digest of the last entry checked (zero before any).
    pub fn previous(&self) -> Digest {
        self.previous
    }
}

impl Default for ChainChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tel_types::{Actor, EventDraft, EventId, EventType, Resource, Severity, SignatureBytes, Timestamp};

    fn build_chain(count: u64) -> Vec<LedgerEntry> {
        let mut chain = Vec::new();
        let mut previous = Digest::zero();
        for i in 0..count {
            let draft = EventDraft::new(
                EventType::DataAccess,
                Severity::Low,
                Actor::user(format!("user-{i}")),
                Resource::new("record", format!("r{i}")),
                "read",
            );
            let event = AuditEvent::unsealed(EventId::new(), Timestamp(i), draft);
            let current = link_digest(&canonical_event_bytes(&event).unwrap(), &previous);
            chain.push(LedgerEntry {
                sequence_number: i,
                leaf_index: i,
                event: event.seal(previous, current, SignatureBytes::empty()),
                merkle_root: Digest::zero(),
            });
            previous = current;
        }
        chain
    }

    fn run(chain: &[LedgerEntry]) -> Vec<(u64, Vec<BreakReason>)> {
        let mut checker = ChainChecker::new();
        chain
            .iter()
            .map(|e| (e.sequence_number, checker.check(e).faults))
            .filter(|(_, f)| !f.is_empty())
            .collect()
    }

    #[test]
    fn intact_chain_has_no_faults() {
        assert!(run(&build_chain(10)).is_empty());
    }

    #[test]
    fn link_digest_depends_on_previous() {
        let a = link_digest(b"payload", &Digest::zero());
        let b = link_digest(b"payload", &Digest::of(b"x"));
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_field_breaks_entry_and_successor_link() {
        let mut chain = build_chain(3);
        chain[1].event.action = "delete".into();
        assert_eq!(
            run(&chain),
            vec![
                (1, vec![BreakReason::DigestMismatch]),
                (2, vec![BreakReason::LinkMismatch]),
            ]
        );
    }

    #[test]
    fn genesis_with_nonzero_previous_is_a_link_break() {
        let mut chain = build_chain(1);
        chain[0].event.previous_digest = Digest::of(b"bogus");
        let faults = run(&chain);
        assert_eq!(faults[0].0, 0);
        assert!(faults[0].1.contains(&BreakReason::LinkMismatch));
    }

    #[test]
    fn gap_in_sequence_detected() {
        let mut chain = build_chain(3);
        chain.remove(1);
        let faults = run(&chain);
        assert_eq!(faults.len(), 1);
        assert!(faults[0].1.contains(&BreakReason::SequenceMismatch));
        assert!(faults[0].1.contains(&BreakReason::LinkMismatch));
    }

    #[test]
    fn leaf_index_must_track_sequence() {
        let mut chain = build_chain(2);
        chain[1].leaf_index = 7;
        assert_eq!(run(&chain), vec![(1, vec![BreakReason::LeafIndexMismatch])]);
    }

    #[test]
    fn uncanonicalizable_entry_is_a_digest_mismatch() {
        let mut chain = build_chain(2);
        chain[0].event.actor.id.clear();
        let mut checker = ChainChecker::new();
        let check = checker.check(&chain[0]);
        assert_eq!(check.recomputed, Digest::zero());
        assert_eq!(check.faults, vec![BreakReason::DigestMismatch]);
        assert!(!checker.check(&chain[1]).is_intact());
    }

    #[test]
    fn resume_continues_mid_chain() {
        let chain = build_chain(4);
        let mut checker = ChainChecker::resume(2, chain[1].current_digest());
        assert!(checker.check(&chain[2]).is_intact());
        assert!(checker.check(&chain[3]).is_intact());
        assert_eq!(checker.previous(), chain[3].current_digest());
    }

    #[test]
    fn reasons_serialize_snake_case() {
        let json = serde_json::to_string(&BreakReason::LeafIndexMismatch).unwrap();
        assert_eq!(json, "\"leaf_index_mismatch\"");
    }
}
