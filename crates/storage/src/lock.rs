//! Per-path mutual exclusion for read-modify-write cycles.
//!
//! A [`PathLocks`] registry hands out one async mutex per (validated) storage
//! path. It is an ordinary value: create one per library and share it by
//! reference or `Arc` with every writer that touches the same backend.
//! Writers that cannot get the lock within their [`RetryPolicy`] fail with
//! [`LockTimeout`](ErrorKind::LockTimeout) instead of dropping the write.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

/// How long a writer keeps trying before giving up on a lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of acquisition attempts (at least one is always made).
    pub attempts: u32,
    /// Pause between two failed attempts.
    pub delay: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            delay: Duration::from_millis(50),
        }
    }
}

/// Held for the duration of a critical section; the lock is released on drop.
#[derive(Debug)]
pub struct PathGuard {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}
impl PathGuard {
    /// The normalized path this guard protects.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Registry of per-path locks.
///
/// # Examples
///
/// ```
/// use quire_storage::{PathLocks, RetryPolicy};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let locks = PathLocks::new();
/// let guard = locks.acquire(Path::new("state.json"), &RetryPolicy::default()).await?;
/// // ... read, merge, write ...
/// drop(guard);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: SyncMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}
impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        // The map is only touched for a handful of instructions, never across an
        // await, so a poisoned guard still holds a consistent map.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop entries nobody is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Number of paths currently locked or being waited on.
    #[cfg(test)]
    fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }

    /// Acquire the lock for `path`, retrying according to `retry`.
    ///
    /// # Errors
    /// - [`InvalidPath`](ErrorKind::InvalidPath) if the path fails validation.
    /// - [`LockTimeout`](ErrorKind::LockTimeout) once every attempt failed.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn acquire(&self, path: &Path, retry: &RetryPolicy) -> Result<PathGuard> {
        let path = validate_path(path)?;
        let lock = self.lock_for(&path);
        let attempts = retry.attempts.max(1);
        for attempt in 1..=attempts {
            match lock.clone().try_lock_owned() {
                Ok(guard) => return Ok(PathGuard { path, _guard: guard }),
                Err(_) if attempt < attempts => {
                    tracing::trace!(attempt, "path is locked by another writer, retrying");
                    tokio::time::sleep(retry.delay).await;
                },
                Err(_) => {},
            }
        }
        tracing::warn!(attempts, "gave up waiting for path lock");
        exn::bail!(ErrorKind::LockTimeout(path))
    }
}
