//! # Storage Module
//!
//! The block log and everything derived from it.
//!
//! ## Architecture
//!
//! ```text
//! block.rs      Block, BlockLocation, genesis, hash
//! segment.rs    SegmentStore: append, rotation, direct reads, crash repair
//! enumerate.rs  lazy forward-only sequences over the log, cancellation
//! index.rs      BlockIndex: SQLite hash/height → location cache
//! sqlite.rs     connection and bulk-session plumbing
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Block → codec → SegmentStore ──location──▶ BlockIndex
//!                      ▲                          │
//!                      └──── read_block_direct ◀──┘
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Segment files, not a database, for blocks.** The log is append-only
//!    and read sequentially; a length-prefixed flat file is the simplest
//!    format that supports both and survives partial writes.
//!
//! 2. **SQLite for the index.** Lookups by hash and by height, with a
//!    transaction around bulk rebuilds.
//!
//! 3. **Sealed names in locations.** An index row keeps pointing at the right
//!    file after its segment is sealed.

pub mod block;
pub mod enumerate;
pub mod index;
pub mod segment;
pub(crate) mod sqlite;

pub use block::{Block, BlockLocation};
pub use enumerate::{BlockMetadataIter, BlocksFromPointIter, CancelFlag};
pub use index::BlockIndex;
pub use segment::SegmentStore;
