//! Reading state persistence.
//!
//! The state document is only ever changed inside [`update`]: take the lock
//! for its path, read the stored snapshot, change it in memory, then replace
//! the document atomically. The lock holder is the only source of truth until
//! the write completes.

use std::ops::Deref;

use exn::ResultExt;
use quire_storage::error::ErrorKind as StorageErrorKind;
use quire_storage::{BackendHandle, PathLocks};
use quire_sync::{BookmarkRecord, ProgressSnapshot, StateSnapshot, Timestamp, reconcile};
use tracing::instrument;

use crate::Context;
use crate::error::{ErrorKind, Result};

/// Read the stored snapshot. A missing document is an empty snapshot.
pub async fn load_state(backend: &BackendHandle, ctx: &Context) -> Result<StateSnapshot> {
    let data = match backend.read(&ctx.state_file).await {
        Ok(data) => data,
        Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => return Ok(StateSnapshot::default()),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
    };
    StateSnapshot::from_json(&data).or_raise(|| ErrorKind::InvalidState)
}

/// Run one locked read-modify-write cycle on the state document.
pub(crate) async fn update<T>(
    backend: &BackendHandle,
    locks: &PathLocks,
    ctx: &Context,
    change: impl FnOnce(StateSnapshot) -> (StateSnapshot, T),
) -> Result<(StateSnapshot, T)> {
    let guard = locks.acquire(&ctx.state_file, &ctx.retry).await.or_raise(|| ErrorKind::Lock)?;
    let stored = load_state(backend, ctx).await?;
    let (updated, output) = change(stored);
    let data = updated.to_json().or_raise(|| ErrorKind::Serialize)?;
    backend.write(guard.path(), &data).await.or_raise(|| ErrorKind::Storage)?;
    drop(guard);
    Ok((updated, output))
}

/// Merge a client's snapshot into the stored one and persist the result.
///
/// `incoming` is the local side of the merge and the stored snapshot the
/// remote side, so when both carry the same timestamp the stored record wins.
/// Returns the merged snapshot, which the client should adopt.
///
/// # Errors
/// - [`Lock`](ErrorKind::Lock) if another writer held the state for the
///   whole retry budget. Nothing was written; the caller must retry or report.
/// - [`InvalidState`](ErrorKind::InvalidState) if the stored document can't be
///   decoded. It is left untouched.
#[instrument(skip_all, fields(state_file = %ctx.state_file.display(), policy = ?ctx.bookmark_policy))]
pub async fn synchronize(
    backend: &BackendHandle,
    locks: &PathLocks,
    ctx: &Context,
    incoming: StateSnapshot,
) -> Result<StateSnapshot> {
    let policy = ctx.bookmark_policy;
    let (merged, ()) = update(backend, locks, ctx, |stored| (reconcile(incoming, stored, policy), ())).await?;
    tracing::info!(
        books = merged.progress_by_book.len(),
        bookmarks = merged.bookmarks.len(),
        "reading state synchronized"
    );
    Ok(merged)
}

/// Record a reading position. Returns `false` if the stored position was
/// already at least as recent.
#[instrument(skip_all, fields(book_id = %progress.book_id))]
pub async fn save_progress(
    backend: &BackendHandle,
    locks: &PathLocks,
    ctx: &Context,
    progress: ProgressSnapshot,
) -> Result<bool> {
    let (_, recorded) = update(backend, locks, ctx, |mut state| {
        let recorded = state.record_progress(progress);
        (state, recorded)
    })
    .await?;
    Ok(recorded)
}

/// Save a bookmark, updating the existing one at the same location. Returns
/// the stored record.
#[instrument(skip_all, fields(book_id = %bookmark.book_id, id = %bookmark.id))]
pub async fn save_bookmark(
    backend: &BackendHandle,
    locks: &PathLocks,
    ctx: &Context,
    bookmark: BookmarkRecord,
) -> Result<BookmarkRecord> {
    let (_, stored) = update(backend, locks, ctx, |mut state| {
        let stored = state.upsert_bookmark(bookmark).clone();
        (state, stored)
    })
    .await?;
    Ok(stored)
}

/// Delete a bookmark by id. Returns the removed record, if there was one.
#[instrument(skip(backend, locks, ctx))]
pub async fn delete_bookmark(
    backend: &BackendHandle,
    locks: &PathLocks,
    ctx: &Context,
    id: &str,
    at: Timestamp,
) -> Result<Option<BookmarkRecord>> {
    let (_, removed) = update(backend, locks, ctx, |mut state| {
        let removed = state.remove_bookmark(id, at);
        (state, removed)
    })
    .await?;
    Ok(removed)
}
