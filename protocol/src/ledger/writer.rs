//! The single write path: validate, build a block, append, index, lock.
//!
//! ```text
//! tx ──validate──▶ tip (index) ──▶ Block{tip.hash, [tx]} ──▶ segment append
//!                                                              │
//!                              lock cards @ tip height ◀── index add_block
//! ```
//!
//! The whole path runs under one lock, so two submissions for the same card
//! cannot both pass the lock check. Validation reads confirmed ownership
//! only and runs before anything is written. A rejected transaction leaves no trace. An accepted one is not
//! promoted to confirmed ownership here; that is catch-up's job.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::crypto::keys::same_public_key;
use crate::error::{LedgerError, Result};
use crate::ownership::OwnershipStore;
use crate::storage::block::{Block, BlockLocation};
use crate::storage::index::BlockIndex;
use crate::storage::segment::SegmentStore;
use crate::transaction::{MintTransaction, TradeTransaction, Transaction};
use crate::wallet::WalletReader;

pub struct LedgerWriter {
    segments: Arc<SegmentStore>,
    index: Arc<BlockIndex>,
    ownership: Arc<OwnershipStore>,
    wallets: Arc<dyn WalletReader>,
    authority_wallet: PathBuf,
    enforce_card_locks: bool,
    /// Serializes validation, tip lookup, append, and card locking.
    append_lock: Mutex<()>,
}

impl LedgerWriter {
    pub fn new(
        segments: Arc<SegmentStore>,
        index: Arc<BlockIndex>,
        ownership: Arc<OwnershipStore>,
        wallets: Arc<dyn WalletReader>,
        authority_wallet: PathBuf,
    ) -> Self {
        Self {
            segments,
            index,
            ownership,
            wallets,
            authority_wallet,
            enforce_card_locks: false,
            append_lock: Mutex::new(()),
        }
    }

    /// Also reject transactions touching a card with a pending lock.
    pub fn with_card_lock_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_card_locks = enforce;
        self
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, tx: &Transaction) -> Result<()> {
        match tx {
            Transaction::Mint(mint) => self.validate_mint(mint)?,
            Transaction::Trade(trade) => self.validate_trade(trade)?,
        }
        if self.enforce_card_locks {
            for card in tx.referenced_cards() {
                if let Some(lock) = self.ownership.lock_for(&card)? {
                    return Err(LedgerError::invalid(format!(
                        "card {} is locked by a pending transaction at height {}",
                        hex::encode(card),
                        lock.height
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_mint(&self, mint: &MintTransaction) -> Result<()> {
        let authority = self.wallets.load_wallet(&self.authority_wallet)?;
        if !same_public_key(&mint.authority_key, &authority.public_key) {
            return Err(LedgerError::invalid(
                "mint authority key is not the configured authority",
            ));
        }
        mint.verify_signature()
    }

    fn validate_trade(&self, trade: &TradeTransaction) -> Result<()> {
        trade.verify_signatures()?;
        let sides = [
            (&trade.cards_from_user1, &trade.user1_key, "user1"),
            (&trade.cards_from_user2, &trade.user2_key, "user2"),
        ];
        for (cards, expected_owner, label) in sides {
            for card in cards.iter() {
                let owner = self.ownership.get_owner(card)?.ok_or_else(|| {
                    LedgerError::not_found(format!("confirmed owner of card {}", hex::encode(card)))
                })?;
                if !same_public_key(&owner, expected_owner) {
                    return Err(LedgerError::invalid(format!(
                        "card {} is not owned by {label}",
                        hex::encode(card)
                    )));
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Append
    // -----------------------------------------------------------------------

    /// Validate `tx` and append it as a new block on top of the tip.
    ///
    /// The index must be caught up with the log. Every referenced card is
    /// locked at the pre-append tip height.
    pub fn add_transaction(&self, tx: Transaction) -> Result<BlockLocation> {
        let _guard = self.append_lock.lock();
        if let Err(e) = self.validate(&tx) {
            tracing::warn!(kind = tx.kind_name(), error = %e, "transaction rejected");
            return Err(e);
        }
        let transaction_id = tx
            .id()
            .ok_or_else(|| LedgerError::invalid("transaction is not fully signed"))?;

        let tip = self.current_tip()?;
        let cards = tx.referenced_cards();
        let kind = tx.kind_name();

        let block = Block::new(tip.hash, vec![tx]);
        let location = self.segments.append_block(&block)?;
        self.index.add_block(&location)?;
        for card in &cards {
            self.ownership.lock_card(card, tip.height, &transaction_id)?;
        }

        tracing::info!(
            height = location.height,
            kind,
            cards = cards.len(),
            hash = %location.hash_hex(),
            "transaction appended"
        );
        Ok(location)
    }

    /// Location of the highest block, via the index.
    pub fn current_tip(&self) -> Result<BlockLocation> {
        let total = self.segments.total_block_count()?;
        let indexed = self.index.total_indexed_count()?;
        if indexed < total {
            tracing::warn!(indexed, total, "block index is behind the log");
            return Err(LedgerError::IndexBehind { indexed, total });
        }
        let height = total
            .checked_sub(1)
            .ok_or_else(|| LedgerError::not_found("genesis block; initialize the ledger"))?;
        self.index
            .lookup_by_height(height)?
            .ok_or_else(|| LedgerError::not_found(format!("index location for tip height {height}")))
    }
}
