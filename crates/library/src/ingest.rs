use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use exn::ResultExt;
use futures::{Stream, StreamExt, stream};
use quire_storage::BackendHandle;
use quire_storage::error::ErrorKind as StorageErrorKind;
use tracing::instrument;

use crate::book::{Book, book_id, book_path, cover_path};
use crate::cover::{extract_cover_with_timeout, run_with_timeout};
use crate::error::{ErrorKind, Result};
use crate::{Context, MAX_PROCESS_CONCURRENCY};

/// Extensions a stored cover may have.
const COVER_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Add an uploaded EPUB to the library.
///
/// The book is stored under its content id; uploading the same bytes twice
/// stores them once. The cover is extracted with the context's timeout and
/// stored next to the other covers. A missing, unreadable or slow cover never
/// fails the upload, the book is simply stored without one. Metadata is read
/// on the same terms.
///
/// # Errors
/// [`Storage`](ErrorKind::Storage) if the book can't be written.
#[instrument(skip_all, fields(size = epub.len(), id = tracing::field::Empty))]
pub async fn ingest(backend: &BackendHandle, ctx: &Context, epub: Vec<u8>) -> Result<Book> {
    let id = book_id(&epub);
    tracing::Span::current().record("id", id.as_str());
    let epub: Arc<[u8]> = epub.into();

    let file = book_path(&id);
    if backend.exists(&file).await.or_raise(|| ErrorKind::Storage)? {
        tracing::debug!("book already stored");
    } else {
        backend.write(&file, &epub).await.or_raise(|| ErrorKind::Storage)?;
    }

    let cover = match stored_cover(backend, &id).await? {
        Some(path) => Some(path),
        None => match extract_cover_with_timeout(epub.clone(), ctx.cover_timeout).await {
            Some(asset) => {
                let path = cover_path(&id, asset.extension);
                match backend.write(&path, &asset.bytes).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        tracing::warn!(error = ?e, "could not store cover, keeping the book without one");
                        None
                    },
                }
            },
            None => {
                tracing::info!("book has no usable cover");
                None
            },
        },
    };

    let metadata = run_with_timeout(ctx.cover_timeout, move || quire_cover::read_metadata(&*epub)).await;
    let metadata = match metadata {
        Some(Ok(metadata)) => Some(metadata),
        Some(Err(e)) => {
            tracing::warn!(error = ?e, "could not read book metadata");
            None
        },
        None => None,
    };

    tracing::info!(cover = cover.is_some(), "book ingested");
    Ok(Book {
        id,
        file,
        cover,
        metadata,
    })
}

/// Ingest several uploads, up to [`MAX_PROCESS_CONCURRENCY`] at a time.
///
/// Yields `(index, result)` pairs in completion order, `index` being the
/// position of the upload in `uploads`. One upload failing doesn't stop the
/// others.
pub fn ingest_all<'a>(
    backend: &'a BackendHandle,
    ctx: &'a Context,
    uploads: Vec<Vec<u8>>,
) -> impl Stream<Item = (usize, Result<Book>)> + 'a {
    stream::iter(uploads.into_iter().enumerate())
        .map(move |(index, epub)| async move { (index, ingest(backend, ctx, epub).await) })
        .buffer_unordered(MAX_PROCESS_CONCURRENCY)
}

/// The path of a cover already stored for `id`, if any.
async fn stored_cover(backend: &BackendHandle, id: &str) -> Result<Option<PathBuf>> {
    for extension in COVER_EXTENSIONS {
        let path = cover_path(id, extension);
        match backend.stat(&path).await {
            Ok(_) => return Ok(Some(path)),
            Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => {},
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{JPEG, context, epub_with_cover, mock, sample_epub};
    use async_trait::async_trait;
    use quire_storage::backend::{FileInfoStream, MockBackend};
    use quire_storage::error::Result as StorageResult;
    use quire_storage::{FileInfo, StorageBackend};
    use std::path::Path;

    #[tokio::test]
    async fn test_ingest_with_cover() {
        let (mock, backend) = mock();
        let epub = sample_epub("Moby-Dick", true);
        let id = book_id(&epub);

        let book = ingest(&backend, &context(), epub.clone()).await.unwrap();
        assert_eq!(book.id, id);
        assert_eq!(book.file, book_path(&id));
        assert_eq!(book.cover, Some(cover_path(&id, "jpg")));
        assert_eq!(book.metadata.unwrap().title.as_deref(), Some("Moby-Dick"));
        assert_eq!(mock.read(&book.file).await.unwrap(), epub);
        assert_eq!(mock.read(Path::new(&format!("covers/{id}.jpg"))).await.unwrap(), JPEG);
    }

    #[tokio::test]
    async fn test_ingest_without_cover() {
        let (mock, backend) = mock();
        let book = ingest(&backend, &context(), sample_epub("Plain", false)).await.unwrap();
        assert_eq!(book.cover, None);
        assert_eq!(mock.paths().await, [book.file]);
    }

    #[tokio::test]
    async fn test_ingest_not_an_epub() {
        let (mock, backend) = mock();
        let book = ingest(&backend, &context(), b"plain text, not a zip".to_vec()).await.unwrap();
        assert_eq!(book.cover, None);
        assert_eq!(book.metadata, None);
        assert!(mock.exists(&book.file).await.unwrap());
    }

    /// Delegates to a mock, refusing every write under `covers/`.
    struct ReadOnlyCovers(Arc<MockBackend>);

    #[async_trait]
    impl StorageBackend for ReadOnlyCovers {
        fn name(&self) -> &str {
            "read-only-covers"
        }

        fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
            self.0.list_stream(prefix)
        }

        async fn exists(&self, path: &Path) -> StorageResult<bool> {
            self.0.exists(path).await
        }

        async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
            self.0.read(path).await
        }

        async fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
            if path.starts_with(crate::COVERS_DIR) {
                exn::bail!(StorageErrorKind::PermissionDenied(path.to_path_buf()));
            }
            self.0.write(path, data).await
        }

        async fn delete(&self, path: &Path) -> StorageResult<()> {
            self.0.delete(path).await
        }

        async fn stat(&self, path: &Path) -> StorageResult<FileInfo> {
            self.0.stat(path).await
        }
    }

    #[tokio::test]
    async fn test_cover_write_failure_keeps_book() {
        let (mock, _) = mock();
        let backend: BackendHandle = Arc::new(ReadOnlyCovers(mock.clone()));
        let book = ingest(&backend, &context(), sample_epub("Stubborn", true)).await.unwrap();
        assert_eq!(book.cover, None);
        assert_eq!(book.metadata.unwrap().title.as_deref(), Some("Stubborn"));
        assert_eq!(mock.paths().await, [book.file]);
    }

    #[tokio::test]
    async fn test_slow_extraction_keeps_book() {
        let (mock, backend) = mock();
        let ctx = Context {
            cover_timeout: std::time::Duration::ZERO,
            ..context()
        };
        // Large enough that inflating and checksumming it can't beat a zero deadline.
        let mut cover = JPEG.to_vec();
        cover.resize(32 * 1024 * 1024, 0);
        let book = ingest(&backend, &ctx, epub_with_cover("Slow", Some(&cover))).await.unwrap();
        assert_eq!(book.cover, None);
        assert_eq!(mock.paths().await, [book.file]);
    }

    #[tokio::test]
    async fn test_ingest_twice() {
        let (mock, backend) = mock();
        let epub = sample_epub("Twice", true);
        let first = ingest(&backend, &context(), epub.clone()).await.unwrap();
        let second = ingest(&backend, &context(), epub).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.paths().await.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_all() {
        let (mock, backend) = mock();
        let ctx = context();
        let uploads = vec![sample_epub("One", true), sample_epub("Two", false), sample_epub("Three", true)];
        let mut results: Vec<_> = ingest_all(&backend, &ctx, uploads).collect().await;
        results.sort_by_key(|(index, _)| *index);
        let titles: Vec<_> = results
            .into_iter()
            .map(|(_, book)| book.unwrap().metadata.and_then(|m| m.title).unwrap_or_default())
            .collect();
        assert_eq!(titles, ["One", "Two", "Three"]);
        assert_eq!(mock.paths().await.len(), 5);
    }
}
