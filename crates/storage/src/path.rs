//! Path validation.
//!
//! Every path handed to a backend or to [`PathLocks`](crate::PathLocks) is
//! run through [`validate`] first, so lock keys and file locations agree on
//! one normalized spelling and nothing escapes the storage root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a storage path.
///
/// `.` segments, repeated and trailing separators and leading roots are
/// dropped; `..` is resolved but may never climb above the root. Null bytes
/// are rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use quire_storage::validate_path;
/// assert!(validate_path("covers/0a1b.jpg").is_ok());
/// assert!(validate_path("books/../state.json").is_ok());
/// assert!(validate_path("../state.json").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(validate_path("/covers//./0a1b.jpg").unwrap(), Path::new("covers/0a1b.jpg"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}
