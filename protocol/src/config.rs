//! # Ledger Configuration & Constants
//!
//! Every magic number of the on-disk format lives here, next to the one
//! runtime configuration value ([`LedgerConfig`]) that gets threaded through
//! every constructor. There are no process-wide singletons: two ledgers in
//! two temp directories can coexist in the same test binary.
//!
//! Changing any of the wire constants below makes existing segment files
//! unreadable. Bump [`FORMAT_VERSION`] instead of editing them in place.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};

// ---------------------------------------------------------------------------
// Wire Format
// ---------------------------------------------------------------------------

/// Version byte written at the start of every block and transaction payload.
pub const FORMAT_VERSION: u8 = 1;

/// Discriminator byte for `Mint` transactions.
pub const MINT_DISCRIMINATOR: u8 = 1;

/// Discriminator byte for `Trade` transactions.
pub const TRADE_DISCRIMINATOR: u8 = 2;

/// Card hashes are SHA-256 digests of the card name.
pub const CARD_HASH_LENGTH: usize = 32;

/// Previous-hash sentinel of the genesis block.
pub const GENESIS_PREVIOUS_HASH: [u8; 32] = [153u8; 32];

// ---------------------------------------------------------------------------
// Segment Store
// ---------------------------------------------------------------------------

/// Blocks per segment file before rotation.
pub const DEFAULT_SEGMENT_CAPACITY: u32 = 1000;

/// Leading marker of the single writable segment. Stripped on seal.
pub const OPEN_SEGMENT_MARKER: &str = "_";

/// Extension of segment files.
pub const SEGMENT_EXTENSION: &str = "blk";

/// Width of the zero-padded ordinal in segment file names.
pub const SEGMENT_ORDINAL_WIDTH: usize = 6;

// ---------------------------------------------------------------------------
// Ownership Projection
// ---------------------------------------------------------------------------

/// Blocks within this distance of the tip do not touch confirmed ownership.
pub const DEFAULT_SAFETY_THRESHOLD: u64 = 5;

// ---------------------------------------------------------------------------
// File Layout
// ---------------------------------------------------------------------------

pub const BLOCKCHAIN_DIR_NAME: &str = "blockchain";
pub const BLOCK_INDEX_FILE_NAME: &str = "block-index.sqlite";
pub const OWNERSHIP_DB_FILE_NAME: &str = "card-ownership.sqlite";
pub const CARDS_DIR_NAME: &str = "cards";
pub const AUTHORITY_WALLET_FILE_NAME: &str = "authority-wallet.json";

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Runtime configuration of one ledger instance.
///
/// All storage paths derive from `base_dir`:
///
/// ```text
/// <base_dir>/
/// ├── blockchain/              segment files (_000000.blk, 000000.blk, ...)
/// ├── block-index.sqlite       hash/height → location cache
/// ├── card-ownership.sqlite    confirmed owners, locks, checkpoint
/// ├── cards/                   <name>.json card metadata
/// └── authority-wallet.json    default authority wallet
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Root directory for every file the ledger owns.
    pub base_dir: PathBuf,
    /// Confirmation depth `T`.
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: u64,
    /// Blocks per segment.
    #[serde(default = "default_segment_capacity")]
    pub segment_capacity: u32,
    /// Authority wallet used to validate mints. Defaults to
    /// `<base_dir>/authority-wallet.json`.
    #[serde(default)]
    pub authority_wallet_path: Option<PathBuf>,
    /// Reject transactions that reference a card with a pending lock.
    #[serde(default)]
    pub enforce_card_locks: bool,
}

fn default_safety_threshold() -> u64 {
    DEFAULT_SAFETY_THRESHOLD
}

fn default_segment_capacity() -> u32 {
    DEFAULT_SEGMENT_CAPACITY
}

impl LedgerConfig {
    /// Defaults rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            safety_threshold: DEFAULT_SAFETY_THRESHOLD,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            authority_wallet_path: None,
            enforce_card_locks: false,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_safety_threshold(mut self, threshold: u64) -> Self {
        self.safety_threshold = threshold;
        self
    }

    pub fn with_segment_capacity(mut self, capacity: u32) -> Self {
        self.segment_capacity = capacity;
        self
    }

    pub fn with_authority_wallet(mut self, path: impl Into<PathBuf>) -> Self {
        self.authority_wallet_path = Some(path.into());
        self
    }

    pub fn with_card_lock_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_card_locks = enforce;
        self
    }

    /// Reject values the stores cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.segment_capacity == 0 {
            return Err(LedgerError::invalid("segment capacity must be at least 1"));
        }
        Ok(())
    }

    pub fn blockchain_dir(&self) -> PathBuf {
        self.base_dir.join(BLOCKCHAIN_DIR_NAME)
    }

    pub fn block_index_path(&self) -> PathBuf {
        self.base_dir.join(BLOCK_INDEX_FILE_NAME)
    }

    pub fn ownership_db_path(&self) -> PathBuf {
        self.base_dir.join(OWNERSHIP_DB_FILE_NAME)
    }

    pub fn cards_dir(&self) -> PathBuf {
        self.base_dir.join(CARDS_DIR_NAME)
    }

    pub fn authority_wallet(&self) -> PathBuf {
        self.authority_wallet_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join(AUTHORITY_WALLET_FILE_NAME))
    }
}
