use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

/// Largest entry read into memory. Sizes declared in the archive are not
/// trusted, the limit applies to the bytes actually inflated.
pub(crate) const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Read-only view of an EPUB held in memory.
pub(crate) struct Archive<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Archive<'a> {
    pub(crate) fn open(data: &'a [u8]) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(data)).or_raise(|| ErrorKind::Archive)?;
        Ok(Self { zip })
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names()
    }

    /// Bytes of the named entry, or `None` if there is no such entry.
    ///
    /// # Errors
    /// [`Archive`](ErrorKind::Archive) if the entry is unreadable or inflates
    /// past [`MAX_ENTRY_BYTES`].
    pub(crate) fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        self.read_limited(name, MAX_ENTRY_BYTES)
    }

    fn read_limited(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>> {
        let entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Archive),
        };
        let mut contents = Vec::new();
        entry.take(limit.saturating_add(1)).read_to_end(&mut contents).or_raise(|| ErrorKind::Archive)?;
        if contents.len() as u64 > limit {
            tracing::debug!(name, limit, "archive entry too large");
            exn::bail!(ErrorKind::Archive);
        }
        Ok(Some(contents))
    }

    /// Text of the named entry with any UTF-8 BOM removed. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub(crate) fn read_text(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.read(name)?.map(|bytes| String::from_utf8_lossy(strip_bom(&bytes)).into_owned()))
    }

    /// Bytes of the first candidate entry that exists, with its name.
    pub(crate) fn read_first(&mut self, candidates: &[String]) -> Result<Option<(String, Vec<u8>)>> {
        for name in candidates {
            if let Some(bytes) = self.read(name)? {
                return Ok(Some((name.clone(), bytes)));
            }
        }
        Ok(None)
    }
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}
