//! # Cryptographic Primitives
//!
//! Thin wrappers around audited implementations:
//!
//! - **SHA-256** (`sha2`) for card names, block links and signature digests.
//! - **ECDSA over P-256** (`p256`) for transaction signatures.
//!
//! Nothing in here is hand-rolled.

pub mod hash;
pub mod keys;

pub use hash::{card_hash, sha256, sha256_multi};
pub use keys::{same_public_key, verify_signature, CardKeypair};
