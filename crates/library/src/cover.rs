use std::sync::Arc;
use std::time::Duration;

use quire_cover::CoverAsset;
use tracing::instrument;

/// Run blocking work on tokio's blocking pool, giving up after `timeout`.
///
/// Returns `None` when the deadline passes or the work panics. A blocking
/// thread cannot be interrupted: on timeout the work is detached and its
/// result discarded when it eventually finishes.
pub async fn run_with_timeout<T, F>(timeout: Duration, work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "blocking task failed");
            None
        },
        Err(_) => {
            tracing::warn!(?timeout, "blocking task timed out");
            None
        },
    }
}

/// Extract the cover of an upload, bounded by `timeout`.
///
/// A timeout is treated like a book without a cover.
#[instrument(skip(epub), fields(size = epub.len()))]
pub async fn extract_cover_with_timeout(epub: Arc<[u8]>, timeout: Duration) -> Option<CoverAsset> {
    run_with_timeout(timeout, move || quire_cover::extract_cover(&*epub)).await.flatten()
}
