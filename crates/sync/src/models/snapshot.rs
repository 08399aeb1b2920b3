use super::{BookmarkRecord, ProgressSnapshot, Timestamp};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a reader syncs: one progress entry per book plus all bookmarks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default)]
    pub progress_by_book: BTreeMap<String, ProgressSnapshot>,
    #[serde(default)]
    pub bookmarks: Vec<BookmarkRecord>,
    /// When the bookmark list itself last changed, deletions included.
    /// Snapshots written by older clients don't carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks_modified: Option<Timestamp>,
}

impl StateSnapshot {
    /// Decode a snapshot from its JSON document.
    ///
    /// Progress entries are re-keyed by their own `bookId`; when several
    /// entries name the same book the most recent one is kept. Bookmarks are
    /// put in canonical order.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let mut snapshot: Self = serde_json::from_slice(data).or_raise(|| ErrorKind::InvalidSnapshot)?;
        for progress in std::mem::take(&mut snapshot.progress_by_book).into_values() {
            snapshot.record_progress(progress);
        }
        snapshot.sort_bookmarks();
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::Encode)
    }

    pub fn is_empty(&self) -> bool {
        self.progress_by_book.is_empty() && self.bookmarks.is_empty()
    }

    /// Canonical bookmark order: by book, then creation time, then id.
    pub(crate) fn sort_bookmarks(&mut self) {
        self.bookmarks.sort_by(|a, b| {
            (a.book_id.as_str(), a.created_at, a.id.as_str()).cmp(&(b.book_id.as_str(), b.created_at, b.id.as_str()))
        });
    }

    /// When the bookmark list last changed: the explicit marker if present,
    /// otherwise the newest bookmark edit.
    pub fn last_bookmark_change(&self) -> Option<Timestamp> {
        let newest = self.bookmarks.iter().map(|b| b.updated_at).max();
        self.bookmarks_modified.max(newest)
    }

    fn touch_bookmarks(&mut self, at: Timestamp) {
        self.bookmarks_modified = self.bookmarks_modified.max(Some(at));
    }

    pub fn progress(&self, book_id: &str) -> Option<&ProgressSnapshot> {
        self.progress_by_book.get(book_id)
    }

    /// Record a new reading position.
    ///
    /// Returns `false` (and changes nothing) when the stored position is at
    /// least as recent as `progress`.
    pub fn record_progress(&mut self, progress: ProgressSnapshot) -> bool {
        match self.progress_by_book.get(&progress.book_id) {
            Some(existing) if existing.updated_at >= progress.updated_at => false,
            _ => {
                self.progress_by_book.insert(progress.book_id.clone(), progress);
                true
            },
        }
    }

    /// Save a bookmark, updating the existing record at the same location (or
    /// with the same id) instead of adding a duplicate.
    ///
    /// An update keeps the stored id and creation time. An update older than
    /// the stored record is ignored. Returns the stored record.
    pub fn upsert_bookmark(&mut self, bookmark: BookmarkRecord) -> &BookmarkRecord {
        let position = self.bookmarks.iter().position(|b| b.same_location(&bookmark) || b.id == bookmark.id);
        let index = match position {
            Some(index) => {
                let existing = &mut self.bookmarks[index];
                if bookmark.updated_at >= existing.updated_at {
                    existing.cfi = bookmark.cfi;
                    existing.text = bookmark.text;
                    existing.note = bookmark.note;
                    existing.updated_at = bookmark.updated_at;
                }
                index
            },
            None => {
                self.bookmarks.push(bookmark);
                self.bookmarks.len() - 1
            },
        };
        let updated_at = self.bookmarks[index].updated_at;
        self.touch_bookmarks(updated_at);
        &self.bookmarks[index]
    }

    /// Delete a bookmark by id.
    pub fn remove_bookmark(&mut self, id: &str, at: Timestamp) -> Option<BookmarkRecord> {
        let index = self.bookmarks.iter().position(|b| b.id == id)?;
        self.touch_bookmarks(at);
        Some(self.bookmarks.remove(index))
    }

    /// Drop everything recorded for a book. Returns how many records went.
    pub fn forget_book(&mut self, book_id: &str, at: Timestamp) -> usize {
        let progress = usize::from(self.progress_by_book.remove(book_id).is_some());
        let before = self.bookmarks.len();
        self.bookmarks.retain(|b| b.book_id != book_id);
        let bookmarks = before - self.bookmarks.len();
        if bookmarks > 0 {
            self.touch_bookmarks(at);
        }
        progress + bookmarks
    }
}
