use crate::archive::Archive;
use crate::error::{ErrorKind, Result};
use crate::xml::{attribute, local_name};
use quick_xml::Reader;
use quick_xml::events::Event;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Find the archive path of the package (OPF) document.
///
/// Prefers the first `rootfile` in `META-INF/container.xml` that names an
/// `.opf` file, then any `rootfile` at all. When the container is missing,
/// unreadable or empty, falls back to the first `.opf` entry in the archive.
pub(crate) fn locate_package(archive: &mut Archive<'_>) -> Result<String> {
    match archive.read_text(CONTAINER_PATH) {
        Ok(Some(container)) => match rootfiles(&container) {
            Ok(paths) => {
                let preferred = paths.iter().find(|path| is_opf(path)).or_else(|| paths.first());
                if let Some(path) = preferred {
                    return Ok(path.clone());
                }
                tracing::debug!("container names no rootfile");
            },
            Err(e) => tracing::debug!(error = %e, "unreadable container document"),
        },
        Ok(None) => tracing::debug!("archive has no container document"),
        Err(e) => tracing::debug!(error = ?e, "could not read container document"),
    }
    match archive.names().find(|name| is_opf(name)) {
        Some(name) => Ok(name.to_string()),
        None => exn::bail!(ErrorKind::MissingPackage),
    }
}

fn is_opf(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".opf")
}

/// Every non-empty `full-path` in document order.
fn rootfiles(container: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(container);
    reader.config_mut().trim_text(true);
    let mut paths = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path").filter(|path| !path.is_empty()) {
                    paths.push(path);
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }
    Ok(paths)
}
