//! Values produced by cover and metadata extraction.

use derive_more::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A cover image ready to be written to storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverAsset {
    pub bytes: Vec<u8>,
    /// Media type declared by the package (or guessed from the file name when
    /// the package doesn't declare one).
    pub mime_type: String,
    /// Suggested file extension, without the dot: `jpg` or `png`.
    pub extension: &'static str,
}

impl CoverAsset {
    pub(crate) fn new(bytes: Vec<u8>, media_type: &str, path: &str) -> Self {
        let mime_type = if media_type.trim().is_empty() {
            guess_media_type(path).to_string()
        } else {
            media_type.trim().to_ascii_lowercase()
        };
        let extension = extension_for(&mime_type);
        Self {
            bytes,
            mime_type,
            extension,
        }
    }
}

/// Which heuristic located the cover.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "kebab-case"))]
pub enum CoverSource {
    /// `<meta name="cover" content="...">` naming a manifest item.
    #[display("metadata")]
    Metadata,
    /// A manifest item with the `cover-image` property.
    #[display("property")]
    Property,
    /// The first image in the manifest.
    #[display("first-image")]
    FirstImage,
}

/// A located cover together with how it was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cover {
    pub asset: CoverAsset,
    /// Path of the image inside the archive.
    pub path: String,
    pub source: CoverSource,
}

/// Dublin Core metadata from the package document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Metadata {
    pub title: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub creators: Vec<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
}

/// One `<item>` of the package manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ManifestEntry {
    pub(crate) id: String,
    pub(crate) href: String,
    pub(crate) media_type: String,
    pub(crate) properties: String,
}

impl ManifestEntry {
    pub(crate) fn is_image(&self) -> bool {
        self.media_type.trim().to_ascii_lowercase().starts_with("image/")
    }

    /// Whether the EPUB 3 `properties` list includes `cover-image`.
    pub(crate) fn is_cover_image(&self) -> bool {
        self.properties.split_ascii_whitespace().any(|p| p == "cover-image")
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    let subtype = mime_type.rsplit('/').next().unwrap_or_default();
    match subtype {
        "png" => "png",
        // jpeg, jpg and anything unrecognised
        _ => "jpg",
    }
}

fn guess_media_type(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "image/jpeg",
    }
}
