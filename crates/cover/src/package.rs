use crate::error::{ErrorKind, Result};
use crate::models::{CoverSource, ManifestEntry, Metadata};
use crate::xml::{attribute, local_name, resolve_entity};
use exn::ResultExt;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// The parts of an OPF package document that matter here.
#[derive(Debug, Default)]
pub(crate) struct Package {
    pub(crate) manifest: Vec<ManifestEntry>,
    /// `content` of `<meta name="cover">`, the EPUB 2 cover declaration.
    pub(crate) cover_id: Option<String>,
    pub(crate) metadata: Metadata,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Creator,
    Language,
    Publisher,
    Description,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"creator" => Some(Self::Creator),
            b"language" => Some(Self::Language),
            b"publisher" => Some(Self::Publisher),
            b"description" => Some(Self::Description),
            _ => None,
        }
    }
}

impl Package {
    pub(crate) fn parse(opf: &str) -> Result<Self> {
        // Text is trimmed per field once complete, since entity references
        // split it into several events.
        let mut reader = Reader::from_str(opf);
        let mut package = Self::default();
        let mut in_metadata = false;
        let mut field: Option<(Field, String)> = None;
        loop {
            let event = reader
                .read_event()
                .or_raise(|| ErrorKind::MalformedPackage(format!("at byte {}", reader.error_position())))?;
            match event {
                Event::Start(e) => match local_name(e.name().as_ref()) {
                    b"metadata" => in_metadata = true,
                    name if in_metadata => {
                        if let Some(f) = Field::from_name(name) {
                            field = Some((f, String::new()));
                        }
                        package.element(&e);
                    },
                    _ => package.element(&e),
                },
                Event::Empty(e) => package.element(&e),
                Event::Text(e) => {
                    if let Some((_, text)) = field.as_mut() {
                        text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                },
                Event::CData(e) => {
                    if let Some((_, text)) = field.as_mut() {
                        text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                },
                Event::GeneralRef(e) => {
                    if let Some((_, text)) = field.as_mut() {
                        let entity = String::from_utf8_lossy(e.as_ref());
                        match resolve_entity(&entity) {
                            Some(c) => text.push(c),
                            None => text.push_str(&format!("&{entity};")),
                        }
                    }
                },
                Event::End(e) => match local_name(e.name().as_ref()) {
                    b"metadata" => in_metadata = false,
                    name if Field::from_name(name).is_some() => {
                        if let Some((f, text)) = field.take() {
                            package.metadata.set(f, text);
                        }
                    },
                    _ => {},
                },
                Event::Eof => break,
                _ => {},
            }
        }
        Ok(package)
    }

    /// Record a manifest `<item>` or a cover `<meta>`; other elements are ignored.
    fn element(&mut self, e: &BytesStart<'_>) {
        match local_name(e.name().as_ref()) {
            b"item" => self.manifest.push(ManifestEntry {
                id: attribute(e, b"id").unwrap_or_default(),
                href: attribute(e, b"href").unwrap_or_default(),
                media_type: attribute(e, b"media-type").unwrap_or_default(),
                properties: attribute(e, b"properties").unwrap_or_default(),
            }),
            b"meta" if self.cover_id.is_none() && attribute(e, b"name").as_deref() == Some("cover") => {
                self.cover_id = attribute(e, b"content").map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
            },
            _ => {},
        }
    }

    /// Cover candidates in order of preference, each with the heuristic that
    /// produced it. Items without an href are never candidates, and an item is
    /// offered once, under the first heuristic that names it.
    ///
    /// The image fallback offers every image in manifest order, so a declared
    /// cover missing from the archive still leaves the other images to try.
    pub(crate) fn cover_candidates(&self) -> Vec<(&ManifestEntry, CoverSource)> {
        let usable = || self.manifest.iter().filter(|item| !item.href.trim().is_empty());
        let by_metadata = self.cover_id.as_deref().and_then(|id| usable().find(|item| item.id == id));
        let by_property = usable().find(|item| item.is_cover_image());

        let declared = [(by_metadata, CoverSource::Metadata), (by_property, CoverSource::Property)]
            .into_iter()
            .filter_map(|(item, source)| item.map(|item| (item, source)));
        let images = usable().filter(|item| item.is_image()).map(|item| (item, CoverSource::FirstImage));

        let mut candidates: Vec<(&ManifestEntry, CoverSource)> = Vec::new();
        for (item, source) in declared.chain(images) {
            if !candidates.iter().any(|(seen, _)| std::ptr::eq(*seen, item)) {
                candidates.push((item, source));
            }
        }
        candidates
    }
}

impl Metadata {
    fn set(&mut self, field: Field, text: String) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let text = text.to_string();
        match field {
            Field::Creator => self.creators.push(text),
            Field::Title => {
                self.title.get_or_insert(text);
            },
            Field::Language => {
                self.language.get_or_insert(text);
            },
            Field::Publisher => {
                self.publisher.get_or_insert(text);
            },
            Field::Description => {
                self.description.get_or_insert(text);
            },
        }
    }
}
