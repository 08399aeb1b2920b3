use crate::models::{BookmarkRecord, ProgressSnapshot, StateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::instrument;

/// How the bookmark lists of two snapshots are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookmarkPolicy {
    /// Union both lists. When both sides hold the same id, the record with the
    /// later `updatedAt` wins. Records left at the same location (book and
    /// CFI) under different ids are folded into the earliest created one,
    /// which takes the content of the latest edit.
    ///
    /// Concurrent additions on either side always survive. A bookmark deleted
    /// on one side while the other side still holds it comes back.
    #[default]
    UpsertById,
    /// Whichever side changed its bookmark list last wins wholesale.
    ///
    /// Deletions stick, but a bookmark added on the losing side since the
    /// last sync is dropped.
    Replace,
}

/// Merge a locally cached snapshot with the remotely persisted one.
///
/// Progress is merged per book: the entry with the later `updatedAt` wins and a
/// book known to only one side is kept as-is. Bookmarks are merged according to
/// `policy`. Whenever both sides carry the same timestamp the remote record is
/// kept, so the result never depends on which client merged first.
///
/// The result is canonical (bookmarks sorted by book, creation time and id),
/// which makes `reconcile(s, s)` equal to `s` for any canonical snapshot `s`.
#[instrument(skip_all, fields(?policy))]
pub fn reconcile(local: StateSnapshot, remote: StateSnapshot, policy: BookmarkPolicy) -> StateSnapshot {
    let bookmarks_modified = local.bookmarks_modified.max(remote.bookmarks_modified);
    let bookmarks = match policy {
        BookmarkPolicy::UpsertById => upsert_by_id(local.bookmarks, remote.bookmarks),
        BookmarkPolicy::Replace => {
            if local.last_bookmark_change() > remote.last_bookmark_change() {
                tracing::debug!("local bookmarks are newer, replacing remote list");
                local.bookmarks
            } else {
                remote.bookmarks
            }
        },
    };
    let mut merged = StateSnapshot {
        progress_by_book: merge_progress(local.progress_by_book, remote.progress_by_book),
        bookmarks,
        bookmarks_modified,
    };
    merged.sort_bookmarks();
    tracing::debug!(
        books = merged.progress_by_book.len(),
        bookmarks = merged.bookmarks.len(),
        "reconciled reading state"
    );
    merged
}

fn merge_progress(
    local: BTreeMap<String, ProgressSnapshot>,
    mut remote: BTreeMap<String, ProgressSnapshot>,
) -> BTreeMap<String, ProgressSnapshot> {
    for (book_id, progress) in local {
        match remote.entry(book_id) {
            Entry::Vacant(slot) => {
                slot.insert(progress);
            },
            Entry::Occupied(mut slot) if progress.updated_at > slot.get().updated_at => {
                tracing::trace!(book_id = %slot.key(), "local progress is newer");
                slot.insert(progress);
            },
            Entry::Occupied(_) => {},
        }
    }
    remote
}

fn upsert_by_id(local: Vec<BookmarkRecord>, remote: Vec<BookmarkRecord>) -> Vec<BookmarkRecord> {
    let mut by_id: BTreeMap<String, BookmarkRecord> =
        remote.into_iter().map(|bookmark| (bookmark.id.clone(), bookmark)).collect();
    for bookmark in local {
        match by_id.entry(bookmark.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(bookmark);
            },
            Entry::Occupied(mut slot) if bookmark.updated_at > slot.get().updated_at => {
                slot.insert(bookmark);
            },
            Entry::Occupied(_) => {},
        }
    }
    collapse_locations(by_id.into_values().collect())
}

/// Keep one bookmark per location, the same way a local upsert does.
fn collapse_locations(mut bookmarks: Vec<BookmarkRecord>) -> Vec<BookmarkRecord> {
    bookmarks.sort_by(|a, b| (a.created_at, a.id.as_str()).cmp(&(b.created_at, b.id.as_str())));
    let mut by_location: BTreeMap<(String, String), BookmarkRecord> = BTreeMap::new();
    for bookmark in bookmarks {
        match by_location.entry((bookmark.book_id.clone(), bookmark.cfi.clone())) {
            Entry::Vacant(slot) => {
                slot.insert(bookmark);
            },
            Entry::Occupied(mut slot) => {
                let kept = slot.get_mut();
                tracing::trace!(kept = %kept.id, dropped = %bookmark.id, "bookmarks share a location");
                if bookmark.updated_at > kept.updated_at {
                    kept.text = bookmark.text;
                    kept.note = bookmark.note;
                    kept.updated_at = bookmark.updated_at;
                }
            },
        }
    }
    by_location.into_values().collect()
}
