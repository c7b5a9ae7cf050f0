//! # Block Structure
//!
//! A block links to its predecessor by hash and carries an ordered list of
//! transactions. In practice the ledger writer puts exactly one transaction
//! in each block.
//!
//! ## Block Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  previous_hash: [u8; 32]                    │
//! │  timestamp: Timestamp     (100 ns ticks)    │
//! ├─────────────────────────────────────────────┤
//! │  transactions: Vec<Transaction>             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! `hash = SHA-256(previous_hash ++ signed_bytes(tx_0) ++ signed_bytes(tx_1) ...)`
//!
//! The timestamp is not covered. The genesis block has the all-153 sentinel
//! as its previous hash and no transactions, so its hash is a constant.

use serde::{Deserialize, Serialize};

use crate::config::GENESIS_PREVIOUS_HASH;
use crate::crypto::hash::sha256_multi;
use crate::error::Result;
use crate::transaction::{Timestamp, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub previous_hash: [u8; 32],
    pub transactions: Vec<Transaction>,
    pub timestamp: Timestamp,
}

impl Block {
    /// A block extending `previous_hash`, stamped with the current time.
    pub fn new(previous_hash: [u8; 32], transactions: Vec<Transaction>) -> Self {
        Self {
            previous_hash,
            transactions,
            timestamp: Timestamp::now(),
        }
    }

    /// The first block of every log.
    pub fn genesis() -> Self {
        Self::new(GENESIS_PREVIOUS_HASH, Vec::new())
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH && self.transactions.is_empty()
    }

    /// Fails with `ValidationFailure` if any transaction is not fully signed.
    pub fn hash(&self) -> Result<[u8; 32]> {
        let signed = self
            .transactions
            .iter()
            .map(Transaction::signed_bytes)
            .collect::<Result<Vec<_>>>()?;
        let mut parts: Vec<&[u8]> = Vec::with_capacity(signed.len() + 1);
        parts.push(&self.previous_hash);
        parts.extend(signed.iter().map(Vec::as_slice));
        Ok(sha256_multi(&parts))
    }

    pub fn hash_hex(&self) -> Result<String> {
        Ok(hex::encode(self.hash()?))
    }
}

// ---------------------------------------------------------------------------
// BlockLocation
// ---------------------------------------------------------------------------

/// Where a block lives in the segment store.
///
/// `segment_file` is always the sealed form of the segment name; readers
/// resolve it to the open file while that segment is still being written.
/// Locations are a cache: they can always be rebuilt by scanning the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub hash: [u8; 32],
    pub segment_file: String,
    pub height: u64,
    /// Byte offset of the payload, just past its length prefix.
    pub offset: u64,
    pub length: u32,
}

impl BlockLocation {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}
