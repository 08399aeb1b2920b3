//! Cover Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes are not a readable ZIP archive.
    #[display("not a readable EPUB archive")]
    Archive,
    /// The archive has no package document to read.
    #[display("no package document found in archive")]
    MissingPackage,
    /// The package document exists but is not well-formed XML.
    #[display("malformed package document: {_0}")]
    MalformedPackage(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The same bytes always produce the same outcome.
        false
    }
}
