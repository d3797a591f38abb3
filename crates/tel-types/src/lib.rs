//! Foundation types for the tamper-evident ledger (TEL).
//!
//! This crate provides the event model and the value types every other TEL
//! crate builds on. Every other TEL crate depends on `tel-types`.
//!
//! # Key Types
//!
//! - [`AuditEvent`]: One immutable audit fact, chained and signed
//! - [`EventDraft`]: The caller-supplied fields of an event, before append
//! - [`LedgerEntry`]: An event at its position in the ledger
//! - [`Digest`]: 32-byte BLAKE3 output; the zero digest is the genesis sentinel
//! - [`EventId`]: UUID v7 event identifier
//! - [`Timestamp`]: Milliseconds since the UNIX epoch
//! - [`canonical`]: The stable byte form that event digests are computed over

pub mod canonical;
pub mod digest;
pub mod entry;
pub mod error;
pub mod event;
pub mod temporal;

pub use canonical::{canonical_event_bytes, CanonicalEncoder};
pub use digest::Digest;
pub use entry::LedgerEntry;
pub use error::TypeError;
pub use event::{
    Actor, ActorKind, AuditEvent, EventDraft, EventId, EventType, Fields, Origin, Resource,
    Severity, SignatureBytes,
};
pub use temporal::Timestamp;
