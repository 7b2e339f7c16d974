//! # Schema References
//!
//! A [`SchemaReference`] says where a schema comes from. Exactly one of:
//!
//! - an inline schema object (from the `defaultSchema` option),
//! - a filesystem path,
//! - an `https://` URL.
//!
//! Strings are classified by prefix only: anything starting with `https://`
//! is remote, everything else is a path.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::ResolveError;

/// The only prefix that marks a schema location as remote.
pub const REMOTE_PREFIX: &str = "https://";

/// Where a schema comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaReference {
    /// An already-parsed schema object. Shared so that its identity can key
    /// the loader cache.
    Inline(Arc<Value>),
    /// A schema file. Relative paths are resolved against the process
    /// working directory when loaded.
    Path(PathBuf),
    /// A remote schema.
    Url(Url),
}

impl SchemaReference {
    pub fn inline(schema: Value) -> Self {
        Self::Inline(Arc::new(schema))
    }

    /// Classify a configured location string as a URL or a path, verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Malformed`] for an `https://` string that is
    /// not a valid URL.
    pub fn from_location(raw: &str) -> Result<Self, ResolveError> {
        if raw.starts_with(REMOTE_PREFIX) {
            Url::parse(raw)
                .map(Self::Url)
                .map_err(|e| ResolveError::Malformed {
                    reason: format!("invalid schema URL `{raw}`: {e}"),
                })
        } else {
            Ok(Self::Path(PathBuf::from(raw)))
        }
    }

    /// Name used in diagnostics: the path or URL, or `<inlined>`.
    pub fn display_name(&self) -> String {
        match self {
            Self::Inline(_) => "<inlined>".to_string(),
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.to_string(),
        }
    }

    pub(crate) fn cache_key(&self) -> CacheKey {
        match self {
            Self::Inline(schema) => CacheKey::Inline(ByAddress(Arc::clone(schema))),
            Self::Path(path) => CacheKey::Path(path.clone()),
            Self::Url(url) => CacheKey::Url(url.to_string()),
        }
    }
}

impl fmt::Display for SchemaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Loader cache key: exact path or URL, or the identity of an inline object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Inline(ByAddress<Value>),
    Path(PathBuf),
    Url(String),
}

/// Compares and hashes an `Arc` by the address of its allocation.
///
/// Holding the `Arc` keeps the allocation alive, so an address can never be
/// reused by a different value while the key exists.
#[derive(Debug)]
pub(crate) struct ByAddress<T>(pub(crate) Arc<T>);

impl<T> Clone for ByAddress<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for ByAddress<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for ByAddress<T> {}

impl<T> Hash for ByAddress<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Resolve `path` against `base_dir` into an absolute, normalized path.
///
/// A relative `base_dir` is itself resolved against the process working
/// directory.
pub fn absolutize(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    let base = if base_dir.is_absolute() {
        base_dir.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(base_dir)
    };
    normalize_path(&base.join(path))
}
