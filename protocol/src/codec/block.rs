//! Block payload layout.
//!
//! ```text
//! version(1)=1 | previousHash(32) | timestamp(8) | txCount(4) | { txLength(4) txPayload }*
//! ```

use super::reader::ByteReader;
use super::transaction::{decode_transaction, encode_transaction};
use super::{put_bytes, put_i64, put_u32};
use crate::config::FORMAT_VERSION;
use crate::error::{LedgerError, Result};
use crate::storage::block::Block;
use crate::transaction::Timestamp;

pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(45 + block.transactions.len() * 256);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&block.previous_hash);
    put_i64(&mut out, block.timestamp.ticks());
    put_u32(&mut out, block.transactions.len() as u32);
    for tx in &block.transactions {
        put_bytes(&mut out, &encode_transaction(tx));
    }
    out
}

pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    let mut reader = ByteReader::new(bytes);
    let version = reader.read_u8("block version")?;
    if version != FORMAT_VERSION {
        return Err(LedgerError::corrupt(format!(
            "unsupported block version {version}"
        )));
    }
    let previous_hash = reader.read_array32("previous hash")?;
    let timestamp = Timestamp::from_ticks(reader.read_i64("block timestamp")?);
    let count = reader.read_u32("transaction count")? as usize;

    // Each entry needs at least its 4-byte length prefix.
    if count > reader.remaining() / 4 {
        return Err(LedgerError::corrupt(format!(
            "transaction count {count} exceeds payload size"
        )));
    }
    let mut transactions = Vec::with_capacity(count);
    for _ in 0..count {
        let payload = reader.read_prefixed("transaction payload")?;
        transactions.push(decode_transaction(payload)?);
    }
    reader.finish("block")?;

    Ok(Block {
        previous_hash,
        transactions,
        timestamp,
    })
}
