//! Cryptographic primitives for the tamper-evident ledger.
//!
//! Provides domain-separated BLAKE3 hashing, Ed25519 signing behind an async
//! [`EventSigner`] seam, time-indexed key resolution for rotated keys,
//! hash-chain link checks, and Merkle trees with an incremental accumulator.
//!
//! All crypto operations wrap established libraries; nothing here is custom
//! cryptography.

pub mod chain;
pub mod hasher;
pub mod keyring;
pub mod merkle;
pub mod signer;

pub use chain::{event_digest, link_digest, BreakReason, ChainChecker, LinkCheck};
pub use hasher::ContentHasher;
pub use keyring::{KeyEpoch, KeyResolver, KeyRing};
pub use merkle::{hash_pair, MerkleProof, MerkleState, MerkleTree, Side};
pub use signer::{
    verify_digest, EventSigner, LocalSigner, Signature, SignatureError, SignerError, SigningKey,
    VerifyingKey,
};
