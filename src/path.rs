//! Slash-separated virtual paths as seen by users.

/// Splits `path` into trimmed, non-empty segments.
///
/// `""`, `"/"` and `" / "` all yield no segments (the root folder).
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Canonical form: leading slash, single separators, no trailing slash.
pub fn normalize(path: &str) -> String {
    let mut out = String::from("/");
    out.push_str(&segments(path).join("/"));
    out
}

/// Splits after the final separator: `"/docs/a.txt"` becomes
/// `("/docs/", "a.txt")` and `"/"` becomes `("/", "")`.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    }
}

/// Appends `name` to a normalized parent path.
pub fn join(parent: &str, name: &str) -> String {
    let parent = normalize(parent);
    if parent == "/" {
        format!("/{}", name.trim())
    } else {
        format!("{parent}/{}", name.trim())
    }
}

/// Whether `name` can be used as a single path segment.
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && !trimmed.contains('/')
}
