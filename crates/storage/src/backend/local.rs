//! Local filesystem storage backend.
//!
//! Files are stored under a root directory and accessed with `tokio::fs`.
//! Writes go through a temporary sibling file that is synced and then renamed
//! over the destination, so the destination is always either the old or the
//! new contents.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::fs::{self, DirEntry};

/// Prefix and suffix of in-flight temporary files. Listing skips them.
const TEMP_PREFIX: &str = ".quire-";
const TEMP_SUFFIX: &str = ".tmp";

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use quire_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("library", "/var/lib/quire")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for the library
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend rooted at an absolute path,
    /// creating the directory if it doesn't exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once on library initialization; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), UtcDateTime::from(modified)))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(TEMP_PREFIX) && n.ends_with(TEMP_SUFFIX))
    }

    /// Write `data` next to `destination`, sync it, then rename it into place.
    ///
    /// Blocking; run on the blocking pool. The temporary file is removed by
    /// `tempfile` if anything fails before the rename.
    fn replace(directory: &Path, destination: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut temp = tempfile::Builder::new().prefix(TEMP_PREFIX).suffix(TEMP_SUFFIX).tempfile_in(directory)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(destination).map_err(|e| e.error)?;
        // Make the rename itself durable.
        #[cfg(unix)]
        std::fs::File::open(directory)?.sync_all()?;
        Ok(())
    }

    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
            && !pfx.starts_with(&relative)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() && !Self::is_temp_file(&relative) && prefix.is_none_or(|pfx| relative.starts_with(pfx)) {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Broken symlinks, in-flight temp files, and siblings of the prefix.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        let directory = abs_path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&directory).await.map_err(|e| Self::map_io_error(e, path))?;
        let data = data.to_vec();
        let written = tokio::task::spawn_blocking(move || Self::replace(&directory, &abs_path, &data))
            .await
            .or_raise(|| ErrorKind::BackendError(format!("write task for `{}` did not complete", path.display())))?;
        Ok(written.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        let relative = validate_path(path)?;
        Self::metadata(&relative, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("local", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("local", "relative/path").is_err());
    }

    #[test]
    fn test_absolute_path_prevents_traversal() {
        let (temp_dir, backend) = backend();
        assert_eq!(backend.absolute_path("covers/abc.jpg").unwrap(), temp_dir.path().join("covers/abc.jpg"));
        assert!(backend.absolute_path("../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("state.json"), b"{}").await.unwrap();
        assert_eq!(backend.read(Path::new("state.json")).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_write_replaces_existing_contents() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("state.json"), b"{\"progress\":{\"a\":1},\"bookmarks\":[]}").await.unwrap();
        backend.write(Path::new("state.json"), b"{}").await.unwrap();
        assert_eq!(backend.read(Path::new("state.json")).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("sync/state.json"), b"{}").await.unwrap();
        backend.write(Path::new("sync/state.json"), b"{ }").await.unwrap();
        let names: Vec<_> = std::fs::read_dir(temp_dir.path().join("sync"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_previous_contents() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("state.json"), b"{\"good\":true}").await.unwrap();
        // A crash between creating the temp file and renaming it leaves a stray
        // temp file behind; the real file must be untouched and listing must
        // ignore the leftover.
        std::fs::write(temp_dir.path().join(".quire-crash123.tmp"), b"{\"go").unwrap();
        assert_eq!(backend.read(Path::new("state.json")).await.unwrap(), b"{\"good\":true}");
        let files = backend.list(None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("state.json"));
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("covers/nested/abc.jpg"), b"jpeg").await.unwrap();
        assert!(backend.exists(Path::new("covers/nested/abc.jpg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("books/abc.epub"), b"zip").await.unwrap();
        backend.delete(Path::new("books/abc.epub")).await.unwrap();
        assert!(!backend.exists(Path::new("books/abc.epub")).await.unwrap());
        let err = backend.delete(Path::new("books/abc.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("covers/abc.png"), b"12345").await.unwrap();
        let info = backend.stat(Path::new("./covers/abc.png")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("covers/abc.png"));
        assert_eq!(info.size, 5);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("covers/a.jpg"), b"a").await.unwrap();
        backend.write(Path::new("covers/b.png"), b"b").await.unwrap();
        backend.write(Path::new("covers-old/c.jpg"), b"c").await.unwrap();
        backend.write(Path::new("books/a.epub"), b"a").await.unwrap();
        let mut paths: Vec<_> =
            backend.list(Some(Path::new("covers"))).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("covers/a.jpg"), PathBuf::from("covers/b.png")]);
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let (_temp_dir, backend) = backend();
        assert!(backend.list(Some(Path::new("covers"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
