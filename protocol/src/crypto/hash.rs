//! # Hashing Utilities
//!
//! SHA-256 is the only hash function in the ledger. It names cards
//! (`SHA-256(UTF-8 name)`), links blocks (`SHA-256(previous_hash ++ signed
//! transaction bytes)`) and is the digest under every ECDSA signature.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of `parts`, without building the
/// concatenated buffer.
///
/// ```
/// use cardledger_protocol::crypto::hash::{sha256, sha256_multi};
///
/// assert_eq!(sha256_multi(&[b"card", b"ledger"]), sha256(b"cardledger"));
/// ```
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hash of a card name as stored on-chain.
pub fn card_hash(name: &str) -> [u8; 32] {
    sha256(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn multi_part_equals_concatenation() {
        let a = [1u8; 32];
        let b = b"payload";
        let mut joined = a.to_vec();
        joined.extend_from_slice(b);
        assert_eq!(sha256_multi(&[&a, b]), sha256(&joined));
    }

    #[test]
    fn card_hash_is_utf8_digest() {
        assert_eq!(card_hash("Black Lotus"), sha256("Black Lotus".as_bytes()));
        assert_ne!(card_hash("Black Lotus"), card_hash("black lotus"));
    }
}
