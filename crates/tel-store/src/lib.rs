//! Storage for the tamper-evident ledger.
//!
//! Two concerns live here: the authoritative entry store the ledger appends
//! to, and the external anchor sinks that exported snapshots are published
//! to.
//!
//! # Entry stores
//!
//! All backends implement the [`EntryStore`] trait:
//!
//! - [`InMemoryEntryStore`] -- `Vec`-backed store for tests and embedding
//! - [`WalEntryStore`] -- single-file, CRC-framed, append-only log
//!
//! # Anchor sinks
//!
//! All sinks implement [`AnchorSink`] (`put(bytes) -> ContentId`):
//!
//! - [`MemoryAnchorSink`]
//! - [`DirectoryAnchorSink`] -- one file per document, named by BLAKE3 hex
//!
//! # Design Rules
//!
//! 1. Entries are dense and append-only; a store rejects any append that is
//!    not the next sequence number.
//! 2. An append is durable before it returns.
//! 3. Corruption is reported, never skipped.

pub mod anchor;
pub mod error;
pub mod memory;
pub mod traits;
pub mod wal;

pub use anchor::{AnchorSink, ContentId, DirectoryAnchorSink, MemoryAnchorSink};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryEntryStore;
pub use traits::EntryStore;
pub use wal::{SyncMode, WalEntryStore};
