//! # Ledger
//!
//! Wires the segment store, block index, ownership projector and writer
//! together from one [`LedgerConfig`].
//!
//! ## Data Flow
//!
//! ```text
//! write:  LedgerWriter → codec → SegmentStore → BlockIndex → lock cards
//! read:   BlockIndex (locate) → SegmentStore (bytes) → codec (decode)
//! repair: SegmentStore::enumerate_metadata → BlockIndex bulk ingest
//!         BlockIndex + SegmentStore → OwnershipProjector::catch_up
//! ```
//!
//! ## Partial Progress
//!
//! Every step is restartable. A crash after an append but before the index
//! update leaves the index one block behind; [`Ledger::catch_up_index`]
//! ingests the missing suffix. A crash during ownership catch-up rolls back
//! to the last committed checkpoint; the next [`Ledger::catch_up_ownership`]
//! resumes from there.

pub mod writer;

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::ownership::{CatchUpReport, LockEntry, OwnershipProjector, OwnershipStore};
use crate::storage::block::{Block, BlockLocation};
use crate::storage::enumerate::{BlocksFromPointIter, CancelFlag};
use crate::storage::index::BlockIndex;
use crate::storage::segment::SegmentStore;
use crate::transaction::{CardHash, Transaction};
use crate::wallet::{JsonWalletReader, WalletReader};

pub use writer::LedgerWriter;

pub struct Ledger {
    config: LedgerConfig,
    segments: Arc<SegmentStore>,
    index: Arc<BlockIndex>,
    projector: OwnershipProjector,
    writer: LedgerWriter,
}

impl Ledger {
    /// Open the stores under `config.base_dir` with JSON wallet files.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        Self::open_with_wallet_reader(config, Arc::new(JsonWalletReader))
    }

    pub fn open_with_wallet_reader(
        config: LedgerConfig,
        wallets: Arc<dyn WalletReader>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.base_dir)?;

        let segments = Arc::new(SegmentStore::new(
            config.blockchain_dir(),
            config.segment_capacity,
        ));
        let index = Arc::new(BlockIndex::open(config.block_index_path())?);
        let ownership = Arc::new(OwnershipStore::open(config.ownership_db_path())?);
        let projector = OwnershipProjector::new(Arc::clone(&ownership), config.safety_threshold);
        let writer = LedgerWriter::new(
            Arc::clone(&segments),
            Arc::clone(&index),
            ownership,
            wallets,
            config.authority_wallet(),
        )
        .with_card_lock_enforcement(config.enforce_card_locks);

        Ok(Self {
            config,
            segments,
            index,
            projector,
            writer,
        })
    }

    /// Create the log and, on an empty log, append and index genesis.
    /// Idempotent.
    pub fn initialize(&self) -> Result<()> {
        self.segments.initialize()?;
        if self.segments.total_block_count()? == 0 {
            let location = self.segments.append_block(&Block::genesis())?;
            self.index.add_block(&location)?;
            tracing::info!(hash = %location.hash_hex(), "genesis block written");
        }
        Ok(())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn projector(&self) -> &OwnershipProjector {
        &self.projector
    }

    pub fn writer(&self) -> &LedgerWriter {
        &self.writer
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn validate(&self, tx: &Transaction) -> Result<()> {
        self.writer.validate(tx)
    }

    pub fn add_transaction(&self, tx: Transaction) -> Result<BlockLocation> {
        self.writer.add_transaction(tx)
    }

    // -----------------------------------------------------------------------
    // Catch-up
    // -----------------------------------------------------------------------

    /// Ingest every block the index is missing. Returns the count ingested.
    pub fn catch_up_index(&self) -> Result<u64> {
        self.catch_up_index_with_cancel(CancelFlag::new())
    }

    /// [`catch_up_index`](Self::catch_up_index) that stops, rolling back,
    /// when `cancel` is raised.
    pub fn catch_up_index_with_cancel(&self, cancel: CancelFlag) -> Result<u64> {
        let indexed = self.index.total_indexed_count()?;
        let total = self.segments.total_block_count()?;
        if indexed >= total {
            return Ok(0);
        }
        tracing::info!(indexed, total, "catching up block index");

        let locations = self
            .segments
            .enumerate_metadata_cancellable(indexed, cancel)?;
        self.index.begin_bulk_ingest()?;
        let ingested = locations.into_iter().try_fold(0u64, |n, location| {
            self.index.ingest_block(&location?)?;
            Ok::<_, LedgerError>(n + 1)
        });
        match ingested {
            Ok(n) => {
                self.index.end_bulk_ingest()?;
                Ok(n)
            }
            Err(e) => {
                self.index.abort_bulk_ingest();
                Err(e)
            }
        }
    }

    /// Drop the index and rebuild it from height 0.
    pub fn rebuild_index(&self) -> Result<u64> {
        self.index.reset()?;
        self.catch_up_index()
    }

    /// Promote blocks past the safety threshold. Refuses to run while the
    /// index is behind the log.
    pub fn catch_up_ownership(&self) -> Result<CatchUpReport> {
        self.projector.catch_up(&self.segments, &self.index)
    }

    /// Drop all ownership state and replay from genesis.
    pub fn rebuild_ownership(&self) -> Result<CatchUpReport> {
        self.projector.store().reset()?;
        self.catch_up_ownership()
    }

    /// Index catch-up followed by ownership catch-up.
    pub fn catch_up(&self) -> Result<(u64, CatchUpReport)> {
        let ingested = self.catch_up_index()?;
        let report = self.catch_up_ownership()?;
        Ok((ingested, report))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get_owner(&self, card: &CardHash) -> Result<Option<Vec<u8>>> {
        self.projector.get_owner(card)
    }

    pub fn lock_for(&self, card: &CardHash) -> Result<Option<LockEntry>> {
        self.projector.lock_for(card)
    }

    pub fn total_blocks(&self) -> Result<u64> {
        self.segments.total_block_count()
    }

    pub fn tip(&self) -> Result<BlockLocation> {
        self.writer.current_tip()
    }

    pub fn location(&self, height: u64) -> Result<BlockLocation> {
        self.index
            .lookup_by_height(height)?
            .ok_or_else(|| LedgerError::not_found(format!("block at height {height}")))
    }

    pub fn read_block(&self, height: u64) -> Result<Block> {
        self.segments.read_block_at(&self.location(height)?)
    }

    /// Blocks from `height` to the current end of the log.
    pub fn blocks_from(&self, height: u64) -> Result<BlocksFromPointIter> {
        self.segments.read_blocks_from_point(&self.location(height)?)
    }
}
