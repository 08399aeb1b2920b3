use std::ops::Deref;
use std::path::{Path, PathBuf};

use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use quire_storage::BackendHandle;
use quire_storage::error::ErrorKind as StorageErrorKind;

use crate::book::book_path;
use crate::error::{ErrorKind, Result};
use crate::COVERS_DIR;

/// Progress events emitted by [`prune_covers`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`Kept`](Self::Kept) or [`Removed`](Self::Removed), once per stored
///    cover.
/// 3. [`Complete`](Self::Complete), exactly once, with the number of covers
///    removed.
///
/// A listing failure ends the stream early without [`Complete`](Self::Complete).
#[derive(Debug, PartialEq, Eq)]
pub enum PruneEvent {
    Started,
    /// The cover's book is still stored.
    Kept(PathBuf),
    /// The cover's book is gone and the cover was deleted.
    Removed(PathBuf),
    Complete(u64),
}

/// Delete covers whose book is no longer stored.
///
/// Failures on individual covers are yielded as `Err` items without ending
/// the stream.
pub fn prune_covers(backend: &BackendHandle) -> impl Stream<Item = Result<PruneEvent>> + '_ {
    stream!({
        yield Ok(PruneEvent::Started);

        let mut removed = 0;
        let mut covers = backend.list_stream(Some(Path::new(COVERS_DIR)));
        while let Some(cover) = covers.next().await {
            let cover = match cover.or_raise(|| ErrorKind::Storage) {
                Ok(cover) => cover,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            // Only direct children of covers/ are covers.
            let Some(id) = cover.stem().filter(|_| cover.is_in(COVERS_DIR)) else {
                continue;
            };
            match prune_cover(backend, id, &cover.path).await {
                Ok(true) => {
                    removed += 1;
                    yield Ok(PruneEvent::Removed(cover.path));
                },
                Ok(false) => yield Ok(PruneEvent::Kept(cover.path)),
                Err(e) => yield Err(e),
            }
        }

        tracing::info!(removed, "orphaned covers pruned");
        yield Ok(PruneEvent::Complete(removed));
    })
}

async fn prune_cover(backend: &BackendHandle, id: &str, cover: &Path) -> Result<bool> {
    if backend.exists(&book_path(id)).await.or_raise(|| ErrorKind::Storage)? {
        return Ok(false);
    }
    match backend.delete(cover).await {
        Ok(()) => Ok(true),
        // Removed concurrently.
        Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => Ok(false),
        Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
    }
}
