//! Snapshot Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A snapshot error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for snapshot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stored document is not a valid snapshot. Don't retry with the same bytes.
    #[display("invalid state snapshot")]
    InvalidSnapshot,
    /// The snapshot could not be encoded.
    #[display("could not encode state snapshot")]
    Encode,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Snapshots are either well-formed or they aren't.
        false
    }
}
