use serde::{Deserialize, Serialize};
use tel_store::ContentId;
use tel_types::{Digest, LedgerEntry, Timestamp};

use crate::error::LedgerError;
use crate::verify::VerificationReport;

/// Self-certifying snapshot of a ledger range.
///
/// The embedded report was produced over exactly `entries`; `valid` mirrors
/// `verification_report.valid` so consumers can decide whether to anchor
/// without inspecting findings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub entries: Vec<LedgerEntry>,
    /// Root the ledger stored with the last exported entry.
    pub merkle_root: Digest,
    pub verification_report: VerificationReport,
    pub export_timestamp: Timestamp,
    pub valid: bool,
}

impl ExportBundle {
    /// Compact JSON encoding handed to anchor sinks.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn first_sequence(&self) -> Option<u64> {
        self.entries.first().map(|e| e.sequence_number)
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.last().map(|e| e.sequence_number)
    }
}

/// Record of a bundle published to an anchor sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub content_id: ContentId,
    pub merkle_root: Digest,
    pub entry_count: u64,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub valid: bool,
}

impl AnchorReceipt {
    pub(crate) fn for_bundle(content_id: ContentId, bundle: &ExportBundle) -> Self {
        Self {
            content_id,
            merkle_root: bundle.merkle_root,
            entry_count: bundle.entries.len() as u64,
            first_sequence: bundle.first_sequence(),
            last_sequence: bundle.last_sequence(),
            valid: bundle.valid,
        }
    }
}
