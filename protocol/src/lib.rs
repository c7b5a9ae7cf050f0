// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Card Ledger Core Library
//!
//! A single-writer, file-backed ledger of who owns which named card. Cards
//! change hands through signed transactions; the ledger keeps them in an
//! append-only block log and derives confirmed ownership from it under a
//! finality margin.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - **codec**: Fixed-layout binary encoding of blocks and transactions.
//! - **storage**: Segmented append-only block log and its rebuildable
//!   SQLite index.
//! - **ownership**: Confirmed owners, pending locks and the checkpoint,
//!   replayed from the log by the projector.
//! - **ledger**: Validation and the single append path.
//! - **transaction**: `Mint | Trade`, canonical strings, signing.
//! - **crypto**: SHA-256 and P-256 ECDSA.
//! - **wallet** / **cards**: Key pair files and card name metadata.
//! - **config** / **error**: One configuration value, one error type.
//!
//! ## Design Philosophy
//!
//! 1. The log is the only source of truth. Indexes and ownership tables can
//!    be deleted and rebuilt at any time.
//! 2. Every step is restartable after a crash at any point.
//! 3. Everything is synchronous. One writer per ledger directory.

pub mod cards;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod ownership;
pub mod storage;
pub mod transaction;
pub mod wallet;

pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError, Result};
pub use ledger::Ledger;
