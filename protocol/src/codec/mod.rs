//! # Binary Codec
//!
//! Fixed-layout encoding of blocks and transactions. This is the format that
//! lands in segment files, so it is written by hand rather than through a
//! serialization framework: every field has an exact offset and width.
//!
//! All integers are little-endian on every host (`to_le_bytes` /
//! `from_le_bytes`). Variable-length fields carry a 4-byte length prefix.
//! Decoding is strict: a length that runs past the buffer, an unknown
//! discriminator, an unknown version, or trailing bytes all fail with
//! `CorruptData`.

pub mod block;
pub mod reader;
pub mod transaction;

pub use block::{decode_block, encode_block};
pub use transaction::{decode_mint, decode_trade, decode_transaction, encode_transaction};

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// `len(4) ++ bytes`
fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// Absent signatures are written as a zero length.
fn put_signature(out: &mut Vec<u8>, signature: Option<&[u8]>) {
    put_bytes(out, signature.unwrap_or(&[]));
}

fn put_hash_list(out: &mut Vec<u8>, hashes: &[[u8; 32]]) {
    put_u32(out, hashes.len() as u32);
    for hash in hashes {
        out.extend_from_slice(hash);
    }
}
