//! Storage models.

use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// File metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// File name without its extension, e.g. the book id of `covers/{id}.jpg`.
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }

    /// Whether this file lives directly inside `dir`, not in a subdirectory
    /// of it.
    pub fn is_in(&self, dir: impl AsRef<Path>) -> bool {
        self.path.parent() == Some(dir.as_ref())
    }
}
