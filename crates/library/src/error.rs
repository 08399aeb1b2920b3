//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the storage and sync
//! crates are kept as children of the library error.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a library failure.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A storage backend operation (read, write, delete, list) failed.
    #[display("storage operation failed")]
    Storage,
    /// The state document stayed locked by another writer for the whole retry
    /// budget. Nothing was written.
    #[display("could not lock the reading state")]
    Lock,
    /// The stored state document is not a valid snapshot. It is left untouched.
    #[display("stored reading state is invalid")]
    InvalidState,
    /// The given id is not a book id, so it can't name anything in the library.
    #[display("invalid book id: {_0}")]
    InvalidBookId(#[error(not(source))] String),
    /// The merged snapshot could not be encoded.
    #[display("could not encode reading state")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Lock.is_retryable());
        assert!(!ErrorKind::InvalidState.is_retryable());
    }
}
