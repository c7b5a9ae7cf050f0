//! # Key Management
//!
//! P-256 ECDSA key pairs for card owners and the minting authority.
//!
//! ## Encodings
//!
//! - Private keys: 32-byte big-endian scalar.
//! - Public keys: SEC1 compressed point (33 bytes). Any valid SEC1 encoding
//!   is accepted on input.
//! - Signatures: 64-byte `r || s`. The message is hashed with SHA-256 by the
//!   signer, so callers pass the raw canonical bytes.
//!
//! Key bytes are never logged.

use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;
use std::fmt;

use crate::error::{LedgerError, Result};

/// Length of a serialized private key.
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Length of a serialized signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// A P-256 signing key with its derived public key.
pub struct CardKeypair {
    signing_key: SigningKey,
}

impl CardKeypair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuild a key pair from a 32-byte private scalar.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|_| LedgerError::invalid("malformed P-256 private key"))?;
        Ok(Self { signing_key })
    }

    /// Private scalar bytes. Handle with care.
    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Compressed SEC1 public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// ECDSA over SHA-256 of `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_bytes().to_vec()
    }
}

impl fmt::Debug for CardKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardKeypair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Check `signature` over `message` against a SEC1-encoded public key.
///
/// Malformed keys and malformed signatures verify as `false`; the caller
/// decides how to report the failure.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

/// True when two SEC1 encodings name the same point, regardless of
/// compressed/uncompressed form.
pub fn same_public_key(a: &[u8], b: &[u8]) -> bool {
    if a == b {
        return true;
    }
    match (VerifyingKey::from_sec1_bytes(a), VerifyingKey::from_sec1_bytes(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
