use std::path::PathBuf;

use quire_cover::Metadata;
use serde::Serialize;

use crate::{BOOK_EXTENSION, BOOKS_DIR, COVERS_DIR};

/// A book stored in the library.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Book {
    /// Lowercase hex BLAKE3 digest of the EPUB bytes.
    pub id: String,
    /// Storage path of the EPUB file.
    pub file: PathBuf,
    /// Storage path of the extracted cover, if one was found.
    pub cover: Option<PathBuf>,
    /// `None` when the package document could not be read.
    pub metadata: Option<Metadata>,
}

/// Identify a book by its content, so the same upload always maps to the
/// same record.
pub fn book_id(epub: &[u8]) -> String {
    blake3::hash(epub).to_hex().to_string()
}

/// `true` for a lowercase hex BLAKE3 digest, the only form [`book_id`] produces.
pub fn is_book_id(id: &str) -> bool {
    id.len() == blake3::OUT_LEN * 2 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn book_path(id: &str) -> PathBuf {
    PathBuf::from(BOOKS_DIR).join(format!("{id}.{BOOK_EXTENSION}"))
}

pub fn cover_path(id: &str, extension: &str) -> PathBuf {
    PathBuf::from(COVERS_DIR).join(format!("{id}.{extension}"))
}
