use std::ops::Deref;
use std::path::{Path, PathBuf};

use exn::ResultExt;
use quire_storage::error::ErrorKind as StorageErrorKind;
use quire_storage::{BackendHandle, PathLocks};
use quire_sync::Timestamp;
use tracing::instrument;

use crate::book::{book_path, is_book_id};
use crate::error::{ErrorKind, Result};
use crate::state::update;
use crate::{COVERS_DIR, Context};

/// What [`forget`] removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Forgotten {
    /// The EPUB file, if it was still stored.
    pub book: Option<PathBuf>,
    pub covers: Vec<PathBuf>,
    /// Progress entries and bookmarks removed from the reading state.
    pub records: usize,
}

/// Delete a book and everything that hangs off it: the EPUB, its covers and
/// its progress and bookmarks.
///
/// Files go first and the reading state last, so an interrupted call can
/// simply be repeated. Forgetting an unknown book is not an error.
///
/// # Errors
/// [`InvalidBookId`](ErrorKind::InvalidBookId) if `book_id` is not a book id.
/// Nothing is touched.
#[instrument(skip(backend, locks, ctx))]
pub async fn forget(backend: &BackendHandle, locks: &PathLocks, ctx: &Context, book_id: &str) -> Result<Forgotten> {
    if !is_book_id(book_id) {
        exn::bail!(ErrorKind::InvalidBookId(book_id.to_string()));
    }
    let book = book_path(book_id);
    let book = delete_if_present(backend, &book).await?.then_some(book);

    let mut covers = Vec::new();
    let stored: Vec<_> = backend.list(Some(Path::new(COVERS_DIR))).await.or_raise(|| ErrorKind::Storage)?;
    for cover in stored.into_iter().filter(|info| info.is_in(COVERS_DIR) && info.stem() == Some(book_id)) {
        if delete_if_present(backend, &cover.path).await? {
            covers.push(cover.path);
        }
    }

    let now = Timestamp::now();
    let (_, records) = update(backend, locks, ctx, |mut state| {
        let records = state.forget_book(book_id, now);
        (state, records)
    })
    .await?;

    tracing::info!(book = book.is_some(), covers = covers.len(), records, "book forgotten");
    Ok(Forgotten { book, covers, records })
}

/// `false` if the file was already gone.
async fn delete_if_present(backend: &BackendHandle, path: &Path) -> Result<bool> {
    match backend.delete(path).await {
        Ok(()) => Ok(true),
        Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => Ok(false),
        Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
    }
}
