use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::event::AuditEvent;

/// An event at its position in a ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 0-based, dense, gapless position.
    pub sequence_number: u64,
    /// Merkle leaf this entry's digest occupies. Equal to `sequence_number`.
    pub leaf_index: u64,
    pub event: AuditEvent,
    /// Accumulator root immediately after this entry was appended.
    pub merkle_root: Digest,
}

impl LedgerEntry {
    pub fn current_digest(&self) -> Digest {
        self.event.current_digest
    }

    pub fn previous_digest(&self) -> Digest {
        self.event.previous_digest
    }

    /// Returns `true` for the first entry of a ledger.
    pub fn is_genesis(&self) -> bool {
        self.sequence_number == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Actor, EventDraft, EventId, EventType, Resource, Severity, SignatureBytes};
    use crate::temporal::Timestamp;

    #[test]
    fn accessors_read_through_to_event() {
        let draft = EventDraft::new(
            EventType::System,
            Severity::Info,
            Actor::system("boot"),
            Resource::new("node", "n1"),
            "start",
        );
        let event = AuditEvent::unsealed(EventId::new(), Timestamp(1), draft).seal(
            Digest::zero(),
            Digest::of(b"cur"),
            SignatureBytes::empty(),
        );
        let entry = LedgerEntry {
            sequence_number: 0,
            leaf_index: 0,
            event,
            merkle_root: Digest::of(b"cur"),
        };
        assert!(entry.is_genesis());
        assert!(entry.previous_digest().is_zero());
        assert_eq!(entry.current_digest(), Digest::of(b"cur"));

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
