//! Cover image and metadata extraction for EPUB files.
//!
//! Works on the raw bytes of an upload: the archive is read in memory, the
//! package document is located through `META-INF/container.xml` (or by
//! scanning entry names when the container is unusable) and the cover is
//! picked from the manifest by the first heuristic that leads to an image
//! actually present in the archive:
//!
//! 1. the item named by `<meta name="cover" content="...">`,
//! 2. an item with the `cover-image` property,
//! 3. the first image in the manifest.
//!
//! Extraction is synchronous and unbounded in time; callers that need a
//! deadline run it on a blocking thread and race it against a timer.

mod archive;
mod container;
pub mod error;
pub mod models;
mod package;
mod resolve;
mod xml;

use tracing::instrument;

use crate::archive::Archive;
use crate::error::{ErrorKind, Result};
pub use crate::models::{Cover, CoverAsset, CoverSource, Metadata};
use crate::package::Package;

/// Extract the cover image from EPUB bytes.
///
/// Never fails: anything that prevents finding a cover (a corrupt archive, a
/// missing or malformed package document, a manifest without images) yields
/// `None`. Use [`try_extract_cover`] to find out why.
pub fn extract_cover(epub: impl AsRef<[u8]>) -> Option<CoverAsset> {
    match try_extract_cover(epub) {
        Ok(cover) => cover.map(|cover| cover.asset),
        Err(e) => {
            tracing::debug!(error = ?e, "no cover extracted");
            None
        },
    }
}

/// Extract the cover image, reporting which heuristic found it.
///
/// `Ok(None)` means the package was readable but no heuristic led to an image
/// present in the archive.
///
/// # Errors
/// - [`Archive`](ErrorKind::Archive) if the bytes are not a readable ZIP.
/// - [`MissingPackage`](ErrorKind::MissingPackage) if no package document
///   can be located.
/// - [`MalformedPackage`](ErrorKind::MalformedPackage) if the package
///   document is not well-formed XML.
#[instrument(skip(epub), fields(size = epub.as_ref().len()))]
pub fn try_extract_cover(epub: impl AsRef<[u8]>) -> Result<Option<Cover>> {
    let mut archive = Archive::open(epub.as_ref())?;
    let (opf_path, package) = open_package(&mut archive)?;
    let opf_dir = resolve::parent_dir(&opf_path);

    for (item, source) in package.cover_candidates() {
        let candidates = resolve::candidates(opf_dir, &item.href);
        match archive.read_first(&candidates)? {
            Some((path, bytes)) => {
                tracing::debug!(%path, %source, "found cover image");
                let asset = CoverAsset::new(bytes, &item.media_type, &path);
                return Ok(Some(Cover { asset, path, source }));
            },
            None => tracing::debug!(href = %item.href, %source, "cover candidate missing from archive"),
        }
    }
    Ok(None)
}

/// Read the Dublin Core metadata of an EPUB.
///
/// # Errors
/// Same as [`try_extract_cover`].
#[instrument(skip(epub), fields(size = epub.as_ref().len()))]
pub fn read_metadata(epub: impl AsRef<[u8]>) -> Result<Metadata> {
    let mut archive = Archive::open(epub.as_ref())?;
    let (_, package) = open_package(&mut archive)?;
    Ok(package.metadata)
}

fn open_package(archive: &mut Archive<'_>) -> Result<(String, Package)> {
    let opf_path = container::locate_package(archive)?;
    let Some(opf) = archive.read_text(&opf_path)? else {
        // The container named an entry that isn't there.
        exn::bail!(ErrorKind::MissingPackage);
    };
    tracing::trace!(%opf_path, "located package document");
    let package = Package::parse(&opf)?;
    Ok((opf_path, package))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Build an in-memory EPUB-shaped archive from `(name, contents)` pairs.
    pub(crate) fn epub(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            let method = if *name == "mimetype" { CompressionMethod::Stored } else { CompressionMethod::Deflated };
            zip.start_file(*name, SimpleFileOptions::default().compression_method(method)).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const CONTAINER: &[u8] = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-png";

    fn opf(metadata: &str, manifest: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{metadata}</metadata>
  <manifest>{manifest}</manifest>
</package>"#
        )
        .into_bytes()
    }

    fn book(opf: &[u8], extra: &[(&str, &[u8])]) -> Vec<u8> {
        let base: [(&str, &[u8]); 3] =
            [("mimetype", b"application/epub+zip"), ("META-INF/container.xml", CONTAINER), ("OEBPS/content.opf", opf)];
        epub(&[&base[..], extra].concat())
    }

    #[test]
    fn test_meta_cover() {
        let opf = opf(
            r#"<dc:title>Sample</dc:title><meta name="cover" content="cover-img"/>"#,
            r#"<item id="chapter" href="chapter.xhtml" media-type="application/xhtml+xml"/>
               <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>"#,
        );
        let data = book(&opf, &[("OEBPS/images/cover.jpg", JPEG)]);

        let cover = try_extract_cover(&data).unwrap().unwrap();
        assert_eq!(cover.path, "OEBPS/images/cover.jpg");
        assert_eq!(cover.source, CoverSource::Metadata);
        assert_eq!(cover.asset.bytes, JPEG);
        assert_eq!(cover.asset.mime_type, "image/jpeg");
        assert_eq!(cover.asset.extension, "jpg");
        assert_eq!(extract_cover(&data), Some(cover.asset));
    }

    #[test]
    fn test_meta_cover_attribute_order() {
        let opf = opf(
            r#"<opf:meta content="c" name="cover"/>"#,
            r#"<opf:item media-type="image/png" href="c.png" id="c"></opf:item>"#,
        );
        let data = book(&opf, &[("OEBPS/c.png", PNG)]);
        let cover = try_extract_cover(&data).unwrap().unwrap();
        assert_eq!(cover.source, CoverSource::Metadata);
        assert_eq!(cover.asset.extension, "png");
    }

    #[test]
    fn test_cover_image_property() {
        let opf = opf(
            "",
            r#"<item id="fig" href="fig.jpg" media-type="image/jpeg"/>
               <item id="c" href="images/c.png" media-type="image/png" properties="cover-image"/>"#,
        );
        let data = book(&opf, &[("OEBPS/fig.jpg", JPEG), ("OEBPS/images/c.png", PNG)]);
        let cover = try_extract_cover(&data).unwrap().unwrap();
        assert_eq!(cover.source, CoverSource::Property);
        assert_eq!(cover.path, "OEBPS/images/c.png");
        assert_eq!(cover.asset.mime_type, "image/png");
    }

    #[test]
    fn test_first_image_fallback() {
        let opf = opf(
            "<dc:title>No cover declared</dc:title>",
            r#"<item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
               <item id="a" href="img/a.jpeg" media-type="image/jpeg"/>
               <item id="b" href="img/b.png" media-type="image/png"/>"#,
        );
        let data = book(&opf, &[("OEBPS/img/a.jpeg", JPEG), ("OEBPS/img/b.png", PNG)]);
        let cover = try_extract_cover(&data).unwrap().unwrap();
        assert_eq!(cover.source, CoverSource::FirstImage);
        assert_eq!(cover.path, "OEBPS/img/a.jpeg");
        assert_eq!(cover.asset.extension, "jpg");
    }

    #[test]
    fn test_dangling_declaration_falls_through() {
        let opf = opf(
            r#"<meta name="cover" content="c"/>"#,
            r#"<item id="c" href="missing.jpg" media-type="image/jpeg"/>
               <item id="d" href="present.png" media-type="image/png"/>"#,
        );
        let data = book(&opf, &[("OEBPS/present.png", PNG)]);
        let cover = try_extract_cover(&data).unwrap().unwrap();
        assert_eq!(cover.source, CoverSource::FirstImage);
        assert_eq!(cover.path, "OEBPS/present.png");
    }

    #[test]
    fn test_no_image_anywhere() {
        let opf = opf(
            r#"<meta name="cover" content="c"/>"#,
            r#"<item id="c" href="missing.jpg" media-type="image/jpeg"/>"#,
        );
        let data = book(&opf, &[]);
        assert_eq!(try_extract_cover(&data).unwrap(), None);
        assert_eq!(extract_cover(&data), None);
    }

    #[test]
    fn test_root_relative_href() {
        let opf = opf(
            "",
            r#"<item id="c" href="/covers/front.jpg" media-type="image/jpeg" properties="cover-image"/>"#,
        );
        let data = book(&opf, &[("covers/front.jpg", JPEG)]);
        assert_eq!(try_extract_cover(&data).unwrap().unwrap().path, "covers/front.jpg");
    }

    #[test]
    fn test_href_relative_to_archive_root() {
        // Some producers write hrefs relative to the archive instead of the package.
        let opf = opf("", r#"<item id="c" href="./cover.jpg" media-type="image/jpeg"/>"#);
        let data = book(&opf, &[("cover.jpg", JPEG)]);
        assert_eq!(try_extract_cover(&data).unwrap().unwrap().path, "cover.jpg");
    }

    #[test]
    fn test_percent_encoded_href() {
        let opf = opf("", r#"<item id="c" href="images/front%20cover.jpg" media-type="image/jpeg"/>"#);
        let data = book(&opf, &[("OEBPS/images/front cover.jpg", JPEG)]);
        assert_eq!(try_extract_cover(&data).unwrap().unwrap().path, "OEBPS/images/front cover.jpg");
    }

    #[test]
    fn test_undeclared_media_type() {
        let opf = opf(r#"<meta name="cover" content="c"/>"#, r#"<item id="c" href="c.png"/>"#);
        let data = book(&opf, &[("OEBPS/c.png", PNG)]);
        let asset = extract_cover(&data).unwrap();
        assert_eq!(asset.mime_type, "image/png");
        assert_eq!(asset.extension, "png");
    }

    #[test]
    fn test_package_without_container() {
        let opf = opf("", r#"<item id="c" href="c.jpg" media-type="image/jpeg"/>"#);
        let data = epub(&[
            ("mimetype", b"application/epub+zip"),
            ("book/package.opf", opf.as_slice()),
            ("book/c.jpg", JPEG),
        ]);
        assert_eq!(try_extract_cover(&data).unwrap().unwrap().path, "book/c.jpg");
    }

    #[test]
    fn test_corrupt_input() {
        assert_eq!(extract_cover(b"PK\x03\x04 truncated"), None);
        let err = try_extract_cover(b"not a zip").unwrap_err();
        assert_eq!(*err, ErrorKind::Archive);
    }

    #[test]
    fn test_container_names_missing_package() {
        let data = epub(&[("META-INF/container.xml", CONTAINER)]);
        let err = try_extract_cover(&data).unwrap_err();
        assert_eq!(*err, ErrorKind::MissingPackage);
    }

    #[test]
    fn test_malformed_package() {
        let data = book(b"<package><manifest><item id='c'></package>", &[]);
        let err = try_extract_cover(&data).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedPackage(_)));
        assert_eq!(extract_cover(&data), None);
    }

    #[test]
    fn test_read_metadata() {
        let opf = opf(
            r#"<dc:title>Moby-Dick</dc:title><dc:creator>Herman Melville</dc:creator><dc:language>en</dc:language>"#,
            "",
        );
        let metadata = read_metadata(book(&opf, &[])).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Moby-Dick"));
        assert_eq!(metadata.creators, ["Herman Melville"]);
        assert_eq!(metadata.language.as_deref(), Some("en"));
    }
}
