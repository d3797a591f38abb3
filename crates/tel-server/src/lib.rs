//! HTTP server for the tamper-evident ledger.
//!
//! Exposes append, search, verification, export and anchoring of one ledger
//! over a small JSON API. The ledger lives in a [`DataDir`]: a write-ahead
//! entry log, the signing key, and the history of verifying keys.

pub mod config;
pub mod data;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

#[cfg(test)]
mod testing;

pub use config::ServerConfig;
pub use data::DataDir;
pub use error::{ServerError, ServerResult};
pub use handler::{AppState, AppendResponse};
pub use server::TelServer;
