//! The quire library: books, their covers and the reading state.
//!
//! Every operation takes the [`BackendHandle`](quire_storage::BackendHandle)
//! to work on and a [`Context`] describing how to work. Operations that
//! modify the reading state also take the [`PathLocks`](quire_storage::PathLocks)
//! registry shared by every writer of that backend.
//!
//! Storage layout, relative to the backend root:
//!
//! ```text
//! books/{id}.epub      uploaded EPUB, id = BLAKE3 of its bytes
//! covers/{id}.{ext}    extracted cover image
//! state.json           reading progress and bookmarks (configurable)
//! ```

mod book;
mod cover;
pub mod error;
mod forget;
mod ingest;
mod prune;
mod state;

use std::path::PathBuf;
use std::time::Duration;

use quire_storage::RetryPolicy;
use quire_sync::BookmarkPolicy;

pub use crate::book::{Book, book_id, book_path, cover_path, is_book_id};
pub use crate::cover::{extract_cover_with_timeout, run_with_timeout};
pub use crate::forget::{Forgotten, forget};
pub use crate::ingest::{ingest, ingest_all};
pub use crate::prune::{PruneEvent, prune_covers};
pub use crate::state::{delete_bookmark, load_state, save_bookmark, save_progress, synchronize};

pub const BOOKS_DIR: &str = "books";
pub const COVERS_DIR: &str = "covers";
pub const BOOK_EXTENSION: &str = "epub";
/// Maximum number of uploads processed at once by [`ingest_all`].
pub const MAX_PROCESS_CONCURRENCY: usize = 8;

/// How library operations behave.
#[derive(Clone, Debug, PartialEq)]
pub struct Context {
    /// Path of the reading state document, relative to the backend root.
    pub state_file: PathBuf,
    /// Upper bound on extracting a cover (and metadata) from one upload.
    pub cover_timeout: Duration,
    /// Retry budget for the state document lock.
    pub retry: RetryPolicy,
    pub bookmark_policy: BookmarkPolicy,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("state.json"),
            cover_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            bookmark_policy: BookmarkPolicy::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{Cursor, Write};
    use std::sync::Arc;
    use std::time::Duration;

    use quire_storage::backend::MockBackend;
    use quire_storage::{BackendHandle, RetryPolicy};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    use crate::Context;

    pub(crate) const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0cover";

    /// A minimal EPUB whose manifest declares a JPEG cover (when `with_cover`).
    pub(crate) fn sample_epub(title: &str, with_cover: bool) -> Vec<u8> {
        epub_with_cover(title, with_cover.then_some(JPEG))
    }

    /// A minimal EPUB with `cover` stored as its declared JPEG cover.
    pub(crate) fn epub_with_cover(title: &str, cover: Option<&[u8]>) -> Vec<u8> {
        let (meta, item) = match cover {
            Some(_) => (
                r#"<meta name="cover" content="cover-img"/>"#,
                r#"<item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>"#,
            ),
            None => ("", ""),
        };
        let opf = format!(
            r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title>{meta}</metadata>
  <manifest><item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>{item}</manifest>
</package>"#
        );
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut entries: Vec<(&str, &[u8])> = Vec::new();
        entries.push(("mimetype", &b"application/epub+zip"[..]));
        entries.push(("META-INF/container.xml", container.as_bytes()));
        entries.push(("OEBPS/content.opf", opf.as_bytes()));
        if let Some(cover) = cover {
            entries.push(("OEBPS/images/cover.jpg", cover));
        }
        for (name, contents) in entries {
            zip.start_file(name, options).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub(crate) fn mock() -> (Arc<MockBackend>, BackendHandle) {
        let backend = Arc::new(MockBackend::default());
        let handle: BackendHandle = backend.clone();
        (backend, handle)
    }

    pub(crate) fn context() -> Context {
        Context {
            retry: RetryPolicy {
                attempts: 3,
                delay: Duration::from_millis(1),
            },
            ..Default::default()
        }
    }
}
