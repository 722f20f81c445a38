//! Request path and route-tree name handling.
//!
//! # Responsibilities
//! - Normalize raw request paths
//! - Decide whether a request segment is safe to look up on disk
//! - Classify directory entries as static or dynamic (`[param]`)

use std::borrow::Cow;

/// File stem of the unit that serves a directory path.
pub const INDEX_STEM: &str = "index";

/// Normalize a raw request path.
///
/// Strips the query string, ensures a single leading `/`, and drops one
/// trailing `/`. An empty path becomes `/`.
pub fn normalize_request_path(raw: &str) -> Cow<'_, str> {
    let path = match raw.find('?') {
        Some(q) => &raw[..q],
        None => raw,
    };
    if path.trim().is_empty() || path == "/" {
        return Cow::Borrowed("/");
    }

    let path = match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    };

    if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{}", path))
    }
}

/// Percent-decode one path segment. Invalid UTF-8 yields `None`.
pub fn decode_segment(segment: &str) -> Option<Cow<'_, str>> {
    urlencoding::decode(segment).ok()
}

/// A segment may be looked up on disk only if it cannot escape its directory
/// and carries no NUL or other control characters.
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
        && !segment.chars().any(char::is_control)
}

/// `[name]` → `Some("name")`.
pub fn dynamic_dir_param(name: &str) -> Option<&str> {
    let inner = name.strip_prefix('[')?.strip_suffix(']')?;
    (!inner.is_empty()).then_some(inner)
}

/// `[name].ext` → `Some("name")`.
pub fn dynamic_file_param<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    let stem = name.strip_suffix(extension)?.strip_suffix('.')?;
    dynamic_dir_param(stem)
}

/// `stem` + `.ext`.
pub fn unit_file_name(stem: &str, extension: &str) -> String {
    format!("{}.{}", stem, extension)
}
