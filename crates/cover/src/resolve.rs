use percent_encoding::percent_decode_str;

/// Directory portion of an archive path, without a trailing slash.
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Archive entry names to try, in order, for an href found in the package
/// document at `opf_dir`.
///
/// 1. The href resolved against `opf_dir` (or against the archive root when
///    it starts with `/`), with `.` and `..` segments collapsed.
/// 2. The raw href with a leading `./` or `/` removed.
/// 3. Each of the above percent-decoded.
pub(crate) fn candidates(opf_dir: &str, href: &str) -> Vec<String> {
    let href = href.trim();
    // Fragments and queries never name an archive entry.
    let href = href.split(['#', '?']).next().unwrap_or(href);
    let resolved = match href.strip_prefix('/') {
        Some(absolute) => normalize(absolute),
        None if opf_dir.is_empty() => normalize(href),
        None => normalize(&format!("{opf_dir}/{href}")),
    };
    let alternate = href.strip_prefix("./").or_else(|| href.strip_prefix('/')).unwrap_or(href).to_string();

    let mut names: Vec<String> = Vec::with_capacity(4);
    for name in [resolved, alternate] {
        push_unique(&mut names, name);
    }
    let decoded: Vec<String> = names
        .iter()
        .filter_map(|name| percent_decode_str(name).decode_utf8().ok().map(|d| d.into_owned()))
        .collect();
    for name in decoded {
        push_unique(&mut names, name);
    }
    names
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !name.is_empty() && !names.contains(&name) {
        names.push(name);
    }
}

/// Collapse empty, `.` and `..` segments. `..` never climbs above the root.
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}
