//! Catch-up: replaying the log into confirmed ownership.
//!
//! ```text
//!   0        checkpoint          safe_end = tip - T        tip
//!   |============|=====================|....................|
//!   already      bulk apply            lock sweep
//!   applied      [checkpoint, safe_end] (checkpoint', tip]
//! ```
//!
//! The bulk phase runs in one SQLite transaction: every block's effects and
//! the advancing checkpoint commit together or not at all. Re-applying the
//! checkpoint block is harmless because every effect is an assignment.
//! The sweep then marks each card referenced above the new checkpoint with a
//! lock and leaves confirmed ownership alone.

use std::sync::Arc;

use super::store::{LockEntry, OwnershipStore};
use crate::error::{LedgerError, Result};
use crate::storage::block::Block;
use crate::storage::index::BlockIndex;
use crate::storage::segment::SegmentStore;
use crate::transaction::CardHash;

/// What one catch-up pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    /// Checkpoint after the pass.
    pub checkpoint: Option<u64>,
    /// Blocks replayed in the bulk phase.
    pub blocks_applied: u64,
    /// Lock rows written by the sweep.
    pub locks_written: u64,
    /// Stale locks removed because their height is now confirmed.
    pub locks_cleared: u64,
}

/// Derives confirmed ownership from the log under a safety threshold.
pub struct OwnershipProjector {
    store: Arc<OwnershipStore>,
    safety_threshold: u64,
}

impl OwnershipProjector {
    pub fn new(store: Arc<OwnershipStore>, safety_threshold: u64) -> Self {
        Self {
            store,
            safety_threshold,
        }
    }

    pub fn store(&self) -> &OwnershipStore {
        &self.store
    }

    pub fn safety_threshold(&self) -> u64 {
        self.safety_threshold
    }

    /// Confirmed owner only. Pending locks are never consulted.
    pub fn get_owner(&self, card: &CardHash) -> Result<Option<Vec<u8>>> {
        self.store.get_owner(card)
    }

    pub fn lock_card(&self, card: &CardHash, height: u64, transaction_id: &str) -> Result<()> {
        self.store.lock_card(card, height, transaction_id)
    }

    pub fn unlock_card(&self, card: &CardHash) -> Result<()> {
        self.store.unlock_card(card)
    }

    pub fn lock_for(&self, card: &CardHash) -> Result<Option<LockEntry>> {
        self.store.lock_for(card)
    }

    /// Bring ownership up to `tip - T` and lock everything above it.
    ///
    /// The index must cover the whole log; otherwise this fails with
    /// `IndexBehind` and changes nothing.
    pub fn catch_up(&self, segments: &SegmentStore, index: &BlockIndex) -> Result<CatchUpReport> {
        let total = segments.total_block_count()?;
        let indexed = index.total_indexed_count()?;
        if indexed < total {
            return Err(LedgerError::IndexBehind { indexed, total });
        }
        let mut report = CatchUpReport {
            checkpoint: self.store.checkpoint()?,
            ..CatchUpReport::default()
        };
        let Some(tip) = total.checked_sub(1) else {
            return Ok(report);
        };

        if let Some(safe_end) = tip.checked_sub(self.safety_threshold) {
            let needs_apply = report.checkpoint.map_or(true, |c| c < safe_end);
            if needs_apply {
                let start = report.checkpoint.unwrap_or(0);
                self.store.begin_bulk()?;
                match self.apply_range(segments, index, start, safe_end) {
                    Ok(cleared) => {
                        self.store.end_bulk()?;
                        report.blocks_applied = safe_end - start + 1;
                        report.locks_cleared = cleared;
                        report.checkpoint = Some(safe_end);
                    }
                    Err(e) => {
                        self.store.abort_bulk();
                        return Err(e);
                    }
                }
            }
        }

        let sweep_start = report.checkpoint.map_or(0, |c| c + 1);
        for height in sweep_start..=tip {
            let block = read_at_height(segments, index, height)?;
            for tx in &block.transactions {
                let id = tx.id().ok_or_else(|| {
                    LedgerError::corrupt(format!("unsigned transaction in block {height}"))
                })?;
                for card in tx.referenced_cards() {
                    self.store.lock_card(&card, height, &id)?;
                    report.locks_written += 1;
                }
            }
        }

        tracing::info!(
            tip,
            checkpoint = ?report.checkpoint,
            applied = report.blocks_applied,
            locks = report.locks_written,
            cleared = report.locks_cleared,
            "ownership catch-up complete"
        );
        Ok(report)
    }

    fn apply_range(
        &self,
        segments: &SegmentStore,
        index: &BlockIndex,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        for height in start..=end {
            let block = read_at_height(segments, index, height)?;
            for tx in &block.transactions {
                self.store.apply_transaction(tx)?;
            }
            self.store.set_checkpoint(height)?;
            tracing::debug!(height, txs = block.transactions.len(), "block applied");
        }
        self.store.clear_locks_through(end)
    }
}

fn read_at_height(segments: &SegmentStore, index: &BlockIndex, height: u64) -> Result<Block> {
    let location = index
        .lookup_by_height(height)?
        .ok_or_else(|| LedgerError::not_found(format!("index location for height {height}")))?;
    segments.read_block_at(&location)
}
