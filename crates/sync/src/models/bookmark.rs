use super::Timestamp;
use serde::{Deserialize, Serialize};

/// A user-created marker at a location in a book.
///
/// Ids are client-generated. In practice there is at most one bookmark per
/// `(book_id, cfi)` pair; saving a bookmark at an already-marked location
/// updates the existing record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    pub id: String,
    pub book_id: String,
    pub cfi: String,
    /// Excerpt of the marked text.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
impl BookmarkRecord {
    /// A fresh bookmark, created and updated at the same instant.
    pub fn new(id: impl Into<String>, book_id: impl Into<String>, cfi: impl Into<String>, at: Timestamp) -> Self {
        Self {
            id: id.into(),
            book_id: book_id.into(),
            cfi: cfi.into(),
            text: None,
            note: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Whether both records mark the same location.
    pub fn same_location(&self, other: &Self) -> bool {
        self.book_id == other.book_id && self.cfi == other.cfi
    }
}
