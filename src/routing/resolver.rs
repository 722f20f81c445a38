//! Filesystem route resolution.
//!
//! # Responsibilities
//! - Walk the route tree one request segment at a time
//! - Prefer static entries over dynamic (`[param]`) ones at every level
//! - Bind dynamic segments to parameters
//! - Refuse traversal outside the route root
//!
//! # Design Decisions
//! - No route table: every resolution lists directories afresh, so on-disk
//!   changes are visible immediately. Listings are not a consistent snapshot;
//!   a concurrent rename can produce a stale match.
//! - Ambiguity and duplicate bindings are hard errors, never a silent pick
//! - Listing failures degrade to no-match with a warning

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::routing::segment::{
    decode_segment, dynamic_dir_param, dynamic_file_param, is_safe_segment,
    normalize_request_path, unit_file_name, INDEX_STEM,
};

/// Structural problems in the route tree, found while matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// More than one `[param]` directory among siblings.
    #[error("ambiguous dynamic directories under {dir:?}: {candidates:?}")]
    AmbiguousDirectories { dir: PathBuf, candidates: Vec<PathBuf> },

    /// More than one `[param].ext` file among siblings.
    #[error("ambiguous dynamic files under {dir:?}: {candidates:?}")]
    AmbiguousFiles { dir: PathBuf, candidates: Vec<PathBuf> },

    /// The same parameter name bound twice along one path.
    #[error("duplicate param name in route match: {name}")]
    DuplicateParam { name: String },
}

/// A resolved unit location plus bound path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Absolute, normalized path of the unit source file.
    pub location: PathBuf,
    /// Parameters bound by dynamic segments.
    pub params: HashMap<String, String>,
}

/// Maps request paths onto unit files under a root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    extension: String,
}

impl PathResolver {
    /// Create a resolver for `root`, matching files ending in `.extension`.
    pub fn new(root: impl AsRef<Path>, extension: impl Into<String>) -> Self {
        Self {
            root: absolute_normalized(root.as_ref()),
            extension: extension.into(),
        }
    }

    /// The absolute, normalized route root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source extension recognized as a unit.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// True if `path` is a unit source file name (by extension).
    pub fn is_unit_file(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }

    /// Resolve a request path.
    ///
    /// `Ok(None)` is a plain no-match; `Err` means the tree itself is
    /// ambiguous for this path.
    pub fn resolve(&self, request_path: &str) -> Result<Option<RouteMatch>, RouteError> {
        let path = normalize_request_path(request_path);
        if path == "/" {
            return Ok(self.index_of(&self.root, HashMap::new()));
        }

        let raw_segments: Vec<&str> = path[1..].split('/').collect();
        let mut params = HashMap::new();
        let mut current = self.root.clone();

        for (i, raw) in raw_segments.iter().enumerate() {
            let last = i == raw_segments.len() - 1;

            let segment = match decode_segment(raw) {
                Some(s) => s,
                None => return Ok(None),
            };
            if !is_safe_segment(&segment) {
                return Ok(None);
            }

            // 1. static directory
            let Some(exact_dir) = self.contained(current.join(segment.as_ref())) else {
                return Ok(None);
            };
            if exact_dir.is_dir() {
                current = exact_dir;
                if last {
                    return Ok(self.index_of(&current, params));
                }
                continue;
            }

            // 2. static leaf file
            if last {
                let file_name = unit_file_name(&segment, &self.extension);
                let Some(exact_file) = self.contained(current.join(file_name)) else {
                    return Ok(None);
                };
                if exact_file.is_file() {
                    return Ok(Some(RouteMatch { location: exact_file, params }));
                }
            }

            // 3. dynamic directory
            if let Some((dir, name)) = self.single_dynamic_dir(&current)? {
                bind(&mut params, name, &segment)?;
                current = dir;
                if last {
                    return Ok(self.index_of(&current, params));
                }
                continue;
            }

            // 4. dynamic leaf file
            if last {
                if let Some((file, name)) = self.single_dynamic_file(&current)? {
                    bind(&mut params, name, &segment)?;
                    return Ok(Some(RouteMatch { location: file, params }));
                }
            }

            return Ok(None);
        }

        Ok(None)
    }

    fn index_of(&self, dir: &Path, params: HashMap<String, String>) -> Option<RouteMatch> {
        let index = self.contained(dir.join(unit_file_name(INDEX_STEM, &self.extension)))?;
        index.is_file().then_some(RouteMatch { location: index, params })
    }

    fn contained(&self, candidate: PathBuf) -> Option<PathBuf> {
        let normalized = absolute_normalized(&candidate);
        normalized.starts_with(&self.root).then_some(normalized)
    }

    fn single_dynamic_dir(&self, dir: &Path) -> Result<Option<(PathBuf, String)>, RouteError> {
        let mut matches: Vec<(PathBuf, String)> = list_dir(dir)
            .into_iter()
            .filter(|(path, _)| path.is_dir())
            .filter_map(|(path, name)| dynamic_dir_param(&name).map(|p| (path.clone(), p.to_string())))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(RouteError::AmbiguousDirectories {
                dir: dir.to_path_buf(),
                candidates: sorted_paths(matches),
            }),
        }
    }

    fn single_dynamic_file(&self, dir: &Path) -> Result<Option<(PathBuf, String)>, RouteError> {
        let mut matches: Vec<(PathBuf, String)> = list_dir(dir)
            .into_iter()
            .filter(|(path, _)| path.is_file())
            .filter_map(|(path, name)| {
                dynamic_file_param(&name, &self.extension).map(|p| (path.clone(), p.to_string()))
            })
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(RouteError::AmbiguousFiles {
                dir: dir.to_path_buf(),
                candidates: sorted_paths(matches),
            }),
        }
    }
}

fn bind(params: &mut HashMap<String, String>, name: String, value: &str) -> Result<(), RouteError> {
    if params.contains_key(&name) {
        return Err(RouteError::DuplicateParam { name });
    }
    params.insert(name, value.to_string());
    Ok(())
}

fn sorted_paths(matches: Vec<(PathBuf, String)>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = matches.into_iter().map(|(p, _)| p).collect();
    paths.sort();
    paths
}

/// Directory entries as (path, file name). Failures are logged and read as empty.
fn list_dir(dir: &Path) -> Vec<(PathBuf, String)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to list routes directory");
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| match entry {
            Ok(entry) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                Some((entry.path(), name))
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to read routes directory entry");
                None
            }
        })
        .collect()
}

/// Absolute path with `.` and `..` removed lexically (symlinks untouched).
pub fn absolute_normalized(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const EXT: &str = "rhai";

    fn tree(files: &[&str], dirs: &[&str]) -> (TempDir, PathResolver) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("routes");
        fs::create_dir_all(&root).unwrap();
        for dir in dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let resolver = PathResolver::new(&root, EXT);
        (tmp, resolver)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn location(resolver: &PathResolver, rel: &str) -> PathBuf {
        resolver.root().join(rel)
    }

    #[test]
    fn test_root_index() {
        let (_tmp, resolver) = tree(&["index.rhai"], &[]);
        let m = resolver.resolve("/").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "index.rhai"));
        assert!(m.params.is_empty());
    }

    #[test]
    fn test_root_without_index() {
        let (_tmp, resolver) = tree(&["about.rhai"], &[]);
        assert_eq!(resolver.resolve("/").unwrap(), None);
    }

    #[test]
    fn test_static_dir_index() {
        let (_tmp, resolver) = tree(&["users/index.rhai"], &[]);
        let m = resolver.resolve("/users").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "users/index.rhai"));
    }

    #[test]
    fn test_static_dir_without_index() {
        let (_tmp, resolver) = tree(&[], &["users"]);
        assert_eq!(resolver.resolve("/users").unwrap(), None);
    }

    #[test]
    fn test_exact_leaf_file() {
        let (_tmp, resolver) = tree(&["teapot.rhai"], &[]);
        let m = resolver.resolve("/teapot").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "teapot.rhai"));
    }

    #[test]
    fn test_exact_file_only_matches_leaf() {
        let (_tmp, resolver) = tree(&["users.rhai"], &[]);
        assert_eq!(resolver.resolve("/users/123").unwrap(), None);
    }

    #[test]
    fn test_nested_dynamic_dir() {
        let (_tmp, resolver) = tree(&["users/[id]/posts/index.rhai"], &[]);
        let m = resolver.resolve("/users/123/posts").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "users/[id]/posts/index.rhai"));
        assert_eq!(m.params, params(&[("id", "123")]));
    }

    #[test]
    fn test_dynamic_dir_then_dynamic_file() {
        let (_tmp, resolver) = tree(&["[category]/[id].rhai"], &[]);
        let m = resolver.resolve("/books/123").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "[category]/[id].rhai"));
        assert_eq!(m.params, params(&[("category", "books"), ("id", "123")]));
    }

    #[test]
    fn test_static_beats_dynamic() {
        let (_tmp, resolver) = tree(&["users/index.rhai", "[category]/index.rhai"], &[]);
        let m = resolver.resolve("/users").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "users/index.rhai"));
        assert!(m.params.is_empty());

        let m = resolver.resolve("/books").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "[category]/index.rhai"));
    }

    #[test]
    fn test_static_file_beats_dynamic_file() {
        let (_tmp, resolver) = tree(&["new.rhai", "[id].rhai"], &[]);
        let m = resolver.resolve("/new").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "new.rhai"));
        let m = resolver.resolve("/42").unwrap().unwrap();
        assert_eq!(m.params, params(&[("id", "42")]));
    }

    #[test]
    fn test_dynamic_dir_beats_dynamic_file() {
        let (_tmp, resolver) = tree(&["[x]/index.rhai", "[id].rhai"], &[]);
        let m = resolver.resolve("/foo").unwrap().unwrap();
        assert_eq!(m.location, location(&resolver, "[x]/index.rhai"));
        assert_eq!(m.params, params(&[("x", "foo")]));
    }

    #[test]
    fn test_dynamic_dir_requires_index_for_leaf() {
        let (_tmp, resolver) = tree(&[], &["[id]"]);
        assert_eq!(resolver.resolve("/anything").unwrap(), None);
    }

    #[test]
    fn test_dynamic_file_only_matches_leaf() {
        let (_tmp, resolver) = tree(&["[id].rhai"], &[]);
        assert_eq!(resolver.resolve("/a/b").unwrap(), None);
    }

    #[test]
    fn test_ambiguous_dynamic_dirs() {
        let (_tmp, resolver) = tree(&["[id]/index.rhai", "[slug]/index.rhai"], &[]);
        let err = resolver.resolve("/anything").unwrap_err();
        match err {
            RouteError::AmbiguousDirectories { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_dynamic_files() {
        let (_tmp, resolver) = tree(&["[id].rhai", "[slug].rhai"], &[]);
        assert!(matches!(
            resolver.resolve("/anything"),
            Err(RouteError::AmbiguousFiles { .. })
        ));
    }

    #[test]
    fn test_ambiguity_not_reached_when_static_matches() {
        let (_tmp, resolver) = tree(&["about.rhai", "[id].rhai", "[slug].rhai"], &[]);
        assert!(resolver.resolve("/about").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_param() {
        let (_tmp, resolver) = tree(&["[id]/[id].rhai"], &[]);
        assert_eq!(
            resolver.resolve("/a/b"),
            Err(RouteError::DuplicateParam { name: "id".into() })
        );
    }

    #[rstest]
    #[case("/../secrets")]
    #[case("/a/../b")]
    #[case("/./secrets")]
    #[case("/a\\b")]
    #[case("/users//x")]
    #[case("/%2e%2e/secrets")]
    #[case("/a%2Fb")]
    #[case("/%00")]
    #[case("/users/a%00b")]
    #[case("/line%0Abreak")]
    fn test_unsafe_segments_never_match(#[case] path: &str) {
        // a catch-all dynamic file would otherwise accept any single segment
        let (_tmp, resolver) = tree(&["index.rhai", "[any].rhai", "users/[x].rhai"], &[]);
        assert_eq!(resolver.resolve(path).unwrap(), None);
    }

    #[test]
    fn test_normalizes_trailing_slash_and_query() {
        let (_tmp, resolver) = tree(&["users/index.rhai"], &[]);
        assert!(resolver.resolve("/users/").unwrap().is_some());
        assert!(resolver.resolve("/users?x=y").unwrap().is_some());
        assert!(resolver.resolve("/users/?x=y").unwrap().is_some());
    }

    #[test]
    fn test_percent_decoded_param() {
        let (_tmp, resolver) = tree(&["[name].rhai"], &[]);
        let m = resolver.resolve("/hello%20world").unwrap().unwrap();
        assert_eq!(m.params, params(&[("name", "hello world")]));
    }

    #[test]
    fn test_other_extensions_ignored() {
        let (_tmp, resolver) = tree(&["about.txt", "[id].txt"], &[]);
        assert_eq!(resolver.resolve("/about").unwrap(), None);
    }

    #[test]
    fn test_absolute_normalized() {
        let p = absolute_normalized(Path::new("/a/./b/../c"));
        assert_eq!(p, PathBuf::from("/a/c"));
    }
}
