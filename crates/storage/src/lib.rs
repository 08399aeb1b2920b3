//! Storage for the quire library.
//!
//! Everything the library persists (EPUB files, extracted covers, the reading
//! state document) goes through a [`StorageBackend`]. Paths are always
//! relative to the backend root and validated with [`validate_path`].
//!
//! Two guarantees matter to callers:
//! - [`StorageBackend::write`] replaces files atomically on backends that can
//!   (the [`LocalBackend`](backend::LocalBackend) does, via temp file and
//!   rename), so a crash never leaves a half-written file behind.
//! - [`PathLocks`] serialises read-modify-write cycles per storage path, with
//!   a bounded [`RetryPolicy`] instead of waiting forever.

pub mod backend;
pub mod error;
mod lock;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::lock::{PathGuard, PathLocks, RetryPolicy};
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
