use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for an [`AuditLedger`](crate::AuditLedger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound on a single signer call before the append fails with
    /// `SigningUnavailable`.
    pub sign_timeout_ms: u64,
    /// Entries read per store call during verification. Verification yields
    /// to the runtime between batches.
    pub verify_batch: usize,
    /// Entries read per store call by query iterators and recovery.
    pub query_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sign_timeout_ms: 5_000,
            verify_batch: 1_024,
            query_page_size: 256,
        }
    }
}

impl LedgerConfig {
    pub fn sign_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_timeout_ms)
    }

    pub(crate) fn verify_batch(&self) -> u64 {
        self.verify_batch.max(1) as u64
    }

    pub(crate) fn page_size(&self) -> u64 {
        self.query_page_size.max(1) as u64
    }
}
