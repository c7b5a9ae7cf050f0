//! # Ledger Errors
//!
//! One error type for the whole library. Every fallible operation returns
//! [`Result<T>`] and every variant maps onto exactly one [`ErrorKind`], so
//! callers can branch on the category without matching individual variants.
//!
//! ```text
//! ErrorKind::CorruptData        bad discriminator, truncated payload, bad header
//! ErrorKind::NotFound           unknown card, missing block location
//! ErrorKind::ValidationFailure  signature or ownership mismatch
//! ErrorKind::ConcurrencyMisuse  bulk session double-begin, ingest without begin
//! ErrorKind::IoFailure          file system, SQLite, JSON
//! ```
//!
//! Nothing in the library retries. Errors propagate to the caller immediately
//! and the caller decides whether to re-run catch-up from the last durable
//! checkpoint.

use thiserror::Error;

/// Broad failure category of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CorruptData,
    NotFound,
    ValidationFailure,
    ConcurrencyMisuse,
    IoFailure,
}

/// Errors produced by the codec, the stores and the ledger writer.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("corrupt data: {reason}")]
    CorruptData { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("validation failed: {reason}")]
    ValidationFailure { reason: String },

    #[error("concurrency misuse: {reason}")]
    ConcurrencyMisuse { reason: String },

    /// The block index has fewer rows than the segment store has blocks.
    #[error("block index is behind the log: {indexed} indexed, {total} in log")]
    IndexBehind { indexed: u64, total: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptData {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::ValidationFailure {
            reason: reason.into(),
        }
    }

    pub fn misuse(reason: impl Into<String>) -> Self {
        Self::ConcurrencyMisuse {
            reason: reason.into(),
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CorruptData { .. } => ErrorKind::CorruptData,
            Self::NotFound { .. } | Self::IndexBehind { .. } => ErrorKind::NotFound,
            Self::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            Self::ConcurrencyMisuse { .. } => ErrorKind::ConcurrencyMisuse,
            Self::Cancelled | Self::Io(_) | Self::Storage(_) | Self::Json(_) => {
                ErrorKind::IoFailure
            }
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(LedgerError::corrupt("x").kind(), ErrorKind::CorruptData);
        assert_eq!(LedgerError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(LedgerError::invalid("x").kind(), ErrorKind::ValidationFailure);
        assert_eq!(LedgerError::misuse("x").kind(), ErrorKind::ConcurrencyMisuse);
        assert_eq!(
            LedgerError::IndexBehind { indexed: 1, total: 2 }.kind(),
            ErrorKind::NotFound
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(LedgerError::from(io).kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn display_includes_reason() {
        let err = LedgerError::corrupt("bad discriminator 7");
        assert_eq!(err.to_string(), "corrupt data: bad discriminator 7");
    }
}
