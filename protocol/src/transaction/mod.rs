//! # Transaction Module
//!
//! The two ways card ownership changes: a [`MintTransaction`] issued by the
//! authority, and a [`TradeTransaction`] signed by both parties.
//!
//! ## Architecture
//!
//! ```text
//! types.rs         Transaction sum type, Timestamp, TradeSignatures, canonical strings
//! signing.rs       sign(keypair) per variant
//! verification.rs  signature checks, signed bytes, transaction id
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Build**: `MintTransaction::new` / `TradeTransaction::new`.
//! 2. **Sign**: `sign(&keypair)`. A trade needs both parties.
//! 3. **Validate**: the ledger writer checks signatures, the authority key
//!    and confirmed ownership.
//! 4. **Append**: one transaction per block.
//!
//! ## Design Decisions
//!
//! - The signed message is a text canonical string, not the binary encoding,
//!   so signatures stay stable across wire format versions.
//! - A transaction has no id until every signature is present. The id is the
//!   hex of the fully signed encoding.

pub mod signing;
pub mod types;
pub mod verification;

pub use signing::sign_transaction;
pub use types::{
    CardHash, MintTransaction, Timestamp, TradeParty, TradeSignatures, TradeTransaction,
    Transaction,
};
