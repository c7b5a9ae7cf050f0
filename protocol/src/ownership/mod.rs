//! # Ownership Projection
//!
//! Confirmed card ownership, derived from the block log.
//!
//! ```text
//! store.rs      CardOwnership / OwnershipCheckpoint / CardLock tables
//! projector.rs  catch-up under the safety threshold, lock sweep
//! ```
//!
//! Blocks within `T` of the tip never touch confirmed ownership. Cards they
//! reference show up as lock entries until a later catch-up confirms them.

pub mod projector;
pub mod store;

pub use projector::{CatchUpReport, OwnershipProjector};
pub use store::{LockEntry, OwnershipStore};
