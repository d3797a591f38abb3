//! Core of the tamper-evident audit ledger.
//!
//! An [`AuditLedger`] accepts [`EventDraft`](tel_types::EventDraft)s and
//! turns each into a sealed, signed [`LedgerEntry`](tel_types::LedgerEntry)
//! linked to its predecessor and folded into a running Merkle root. The same
//! handle verifies ranges of history, answers filtered queries, and exports
//! verified snapshots for external anchoring.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tel_crypto::LocalSigner;
//! use tel_ledger::AuditLedger;
//! use tel_store::InMemoryEntryStore;
//! use tel_types::{Actor, EventDraft, EventType, Resource, Severity};
//!
//! # async fn demo() -> Result<(), tel_ledger::LedgerError> {
//! let ledger = AuditLedger::builder(
//!     Arc::new(InMemoryEntryStore::new()),
//!     Arc::new(LocalSigner::generate()),
//! )
//! .open()?;
//!
//! ledger
//!     .append(EventDraft::new(
//!         EventType::Authentication,
//!         Severity::Info,
//!         Actor::user("alice"),
//!         Resource::new("session", "s-1"),
//!         "login",
//!     ))
//!     .await?;
//!
//! assert!(ledger.verify(None, None).await?.valid);
//! # Ok(())
//! # }
//! ```
//!
//! # Design Rules
//!
//! 1. Appends are linearized: sequence numbers are dense and each entry's
//!    `previous_digest` is its predecessor's `current_digest`.
//! 2. An append either fully happens or leaves no trace.
//! 3. Verification recomputes everything from stored fields and reports
//!    findings as data.

pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod query;
pub mod verify;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use export::{AnchorReceipt, ExportBundle};
pub use ledger::{AuditLedger, LedgerBuilder, LedgerHead};
pub use query::{QueryFilter, QueryIter};
pub use verify::{Finding, VerificationReport};
