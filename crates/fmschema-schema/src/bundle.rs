//! # Schema Bundling
//!
//! Turns a schema that spreads across several documents into one
//! self-contained document the validator can compile offline.
//!
//! ## Rules
//!
//! - Every distinct external document reachable through `$ref` is fetched
//!   once and embedded under the root's definitions container (`definitions`
//!   for draft-04/06/07 roots, `$defs` otherwise), keyed by its sanitized
//!   file name.
//! - Every `$ref` to an embedded document is rewritten to an internal JSON
//!   Pointer. References internal to an embedded document are re-based onto
//!   its new location.
//! - `$id` and `$schema` are removed from embedded documents so that their
//!   rewritten pointers resolve against the root.
//! - Relative references resolve against the referencing document. An inline
//!   root has no location; its relative references resolve against the
//!   working directory.
//! - Documents are registered before they are walked, so cycles (including
//!   references back to the root) terminate.
//! - Plain-name fragments (`other.json#anchor`) cannot be re-based and are
//!   rejected.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use url::Url;

use crate::error::LoadError;
use crate::reference::{absolutize, normalize_path, SchemaReference};

/// Upper bound on the number of documents embedded into one bundle.
pub const MAX_DOCUMENTS: usize = 256;

/// Keys whose values are instance data, not subschemas.
const DATA_KEYWORDS: &[&str] = &["const", "default", "enum", "examples"];

/// Keywords whose value maps user-chosen names to subschemas.
const SCHEMA_MAPS: &[&str] = &[
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
];

/// Where a schema document lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    File(PathBuf),
    Remote(Url),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl Location {
    fn is_yaml(&self) -> bool {
        let extension = match self {
            Self::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|segments| segments.last())
                .and_then(|name| name.rsplit_once('.'))
                .map(|(_, ext)| ext.to_ascii_lowercase()),
        };
        matches!(extension.as_deref(), Some("yaml" | "yml"))
    }

    fn file_name(&self) -> Option<String> {
        match self {
            Self::File(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|segments| segments.last())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .or_else(|| url.host_str().map(str::to_string)),
        }
    }
}

/// Fetches and bundles schema documents.
#[derive(Debug, Clone)]
pub struct Bundler {
    client: reqwest::Client,
    allow_remote: bool,
}

impl Bundler {
    pub fn new(client: reqwest::Client, allow_remote: bool) -> Self {
        Self {
            client,
            allow_remote,
        }
    }

    /// Produce a self-contained schema for `reference`.
    ///
    /// # Errors
    ///
    /// Any fetch or parse failure of the root or of a referenced document,
    /// an unsupported reference, or more than [`MAX_DOCUMENTS`] documents.
    pub async fn bundle(&self, reference: &SchemaReference) -> Result<Value, LoadError> {
        let (mut root, root_location) = match reference {
            SchemaReference::Inline(schema) => (Value::clone(schema), None),
            SchemaReference::Path(path) => {
                let location = Location::File(absolutize(Path::new(""), path));
                (self.fetch(&location).await?, Some(location))
            }
            SchemaReference::Url(url) => {
                let mut url = url.clone();
                url.set_fragment(None);
                let location = Location::Remote(url);
                (self.fetch(&location).await?, Some(location))
            }
        };
        let root_name = reference.display_name();
        ensure_schema(&root, &root_name)?;

        let container = definitions_container(&root);
        let mut registry = Registry::new(container, &root, root_location.clone());
        rewrite_refs(&mut root, root_location.as_ref(), "", &mut registry)?;

        let mut embedded = Vec::new();
        while let Some((location, key)) = registry.pending.pop_front() {
            let mut document = self.fetch(&location).await?;
            ensure_schema(&document, &location.to_string())?;
            if let Value::Object(map) = &mut document {
                map.remove("$id");
                map.remove("$schema");
            }
            let prefix = registry.prefix_for(&key);
            rewrite_refs(&mut document, Some(&location), &prefix, &mut registry)?;
            tracing::trace!(document = %location, key = %key, "embedded referenced schema");
            embedded.push((key, document));
        }

        if !embedded.is_empty() {
            // A boolean root has no `$ref` to follow, so it never gets here.
            if let Value::Object(root_map) = &mut root {
                attach(root_map, container, embedded, &root_name)?;
            }
        }
        Ok(root)
    }

    async fn fetch(&self, location: &Location) -> Result<Value, LoadError> {
        let text = match location {
            Location::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| LoadError::Read {
                        location: location.to_string(),
                        source,
                    })?
            }
            Location::Remote(url) => {
                if !self.allow_remote {
                    return Err(LoadError::RemoteDisabled {
                        location: location.to_string(),
                    });
                }
                let http_error = |source: reqwest::Error| LoadError::Http {
                    location: location.to_string(),
                    source,
                };
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(http_error)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status {
                        location: location.to_string(),
                        status: status.as_u16(),
                    });
                }
                response.text().await.map_err(http_error)?
            }
        };
        parse_document(&text, location)
    }
}

/// Insert embedded documents into the root's definitions container.
fn attach(
    root: &mut Map<String, Value>,
    container: &str,
    embedded: Vec<(String, Value)>,
    root_name: &str,
) -> Result<(), LoadError> {
    let definitions = root
        .entry(container.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(definitions) = definitions else {
        return Err(LoadError::Parse {
            location: root_name.to_string(),
            reason: format!("`{container}` must be an object"),
        });
    };
    for (key, document) in embedded {
        definitions.insert(key, document);
    }
    Ok(())
}

fn parse_document(text: &str, location: &Location) -> Result<Value, LoadError> {
    let parsed = if location.is_yaml() {
        serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Value>(text).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| LoadError::Parse {
        location: location.to_string(),
        reason,
    })
}

fn ensure_schema(value: &Value, location: &str) -> Result<(), LoadError> {
    match value {
        Value::Object(_) | Value::Bool(_) => Ok(()),
        _ => Err(LoadError::Parse {
            location: location.to_string(),
            reason: "a schema must be an object or a boolean".to_string(),
        }),
    }
}

/// `definitions` for drafts that predate `$defs`, `$defs` otherwise.
fn definitions_container(root: &Value) -> &'static str {
    let dialect = root.get("$schema").and_then(Value::as_str).unwrap_or("");
    if ["draft-04", "draft-06", "draft-07"]
        .iter()
        .any(|draft| dialect.contains(draft))
    {
        "definitions"
    } else {
        "$defs"
    }
}

/// Embedded documents by location, and the queue of those not yet walked.
struct Registry {
    container: &'static str,
    prefixes: HashMap<Location, String>,
    keys: HashSet<String>,
    pending: VecDeque<(Location, String)>,
}

impl Registry {
    fn new(container: &'static str, root: &Value, root_location: Option<Location>) -> Self {
        let keys = root
            .get(container)
            .and_then(Value::as_object)
            .map(|existing| existing.keys().cloned().collect())
            .unwrap_or_default();
        let mut prefixes = HashMap::new();
        if let Some(location) = root_location {
            prefixes.insert(location, String::new());
        }
        Self {
            container,
            prefixes,
            keys,
            pending: VecDeque::new(),
        }
    }

    fn prefix_for(&self, key: &str) -> String {
        format!("/{}/{}", self.container, key)
    }

    /// Pointer prefix of `location`, scheduling it for embedding when new.
    fn register(&mut self, location: Location) -> Result<String, LoadError> {
        if let Some(prefix) = self.prefixes.get(&location) {
            return Ok(prefix.clone());
        }
        if self.prefixes.len() >= MAX_DOCUMENTS {
            return Err(LoadError::TooManyDocuments {
                location: location.to_string(),
                limit: MAX_DOCUMENTS,
            });
        }
        let key = self.unique_key(&location);
        let prefix = self.prefix_for(&key);
        self.keys.insert(key.clone());
        self.prefixes.insert(location.clone(), prefix.clone());
        self.pending.push_back((location, key));
        Ok(prefix)
    }

    fn unique_key(&self, location: &Location) -> String {
        let base = location
            .file_name()
            .map(|name| sanitize_key(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "schema".to_string());
        let mut candidate = base.clone();
        let mut n = 2;
        while self.keys.contains(&candidate) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }
}

fn sanitize_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Rewrite every `$ref` below `value` into a pointer into the bundle.
fn rewrite_refs(
    value: &mut Value,
    base: Option<&Location>,
    prefix: &str,
    registry: &mut Registry,
) -> Result<(), LoadError> {
    rewrite_refs_in(value, base, prefix, registry, false)
}

/// `names` is set when the keys of `value` are property or definition
/// names rather than keywords, so `default` or `enum` there is a subschema.
fn rewrite_refs_in(
    value: &mut Value,
    base: Option<&Location>,
    prefix: &str,
    registry: &mut Registry,
    names: bool,
) -> Result<(), LoadError> {
    match value {
        Value::Object(map) => {
            if !names {
                if let Some(Value::String(reference)) = map.get_mut("$ref") {
                    *reference = rewrite_ref(reference, base, prefix, registry)?;
                }
            }
            for (key, child) in map.iter_mut() {
                if names {
                    rewrite_refs_in(child, base, prefix, registry, false)?;
                    continue;
                }
                if DATA_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                let child_names = SCHEMA_MAPS.contains(&key.as_str());
                rewrite_refs_in(child, base, prefix, registry, child_names)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_refs_in(item, base, prefix, registry, false)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn rewrite_ref(
    raw: &str,
    base: Option<&Location>,
    prefix: &str,
    registry: &mut Registry,
) -> Result<String, LoadError> {
    let (target, fragment) = raw.split_once('#').unwrap_or((raw, ""));
    let unsupported = |reason: &str| LoadError::UnsupportedReference {
        reference: raw.to_string(),
        location: base.map_or_else(|| "<inlined>".to_string(), ToString::to_string),
        reason: reason.to_string(),
    };

    let document_prefix = if target.is_empty() {
        if prefix.is_empty() {
            // Already relative to the root.
            return Ok(raw.to_string());
        }
        prefix.to_string()
    } else {
        let location = resolve_target(target, base).map_err(|reason| unsupported(&reason))?;
        registry.register(location)?
    };

    if fragment.is_empty() || fragment.starts_with('/') {
        Ok(format!("#{document_prefix}{fragment}"))
    } else {
        Err(unsupported("plain-name fragments cannot be bundled"))
    }
}

fn resolve_target(target: &str, base: Option<&Location>) -> Result<Location, String> {
    if let Ok(url) = Url::parse(target) {
        // Single-letter schemes are drive letters, not URLs.
        if url.scheme().len() > 1 {
            return match url.scheme() {
                "http" | "https" => Ok(Location::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(|path| Location::File(normalize_path(&path)))
                    .map_err(|()| format!("`{target}` is not a local file URL")),
                scheme => Err(format!("unsupported URL scheme `{scheme}`")),
            };
        }
    }
    match base {
        Some(Location::Remote(url)) => url
            .join(target)
            .map(Location::Remote)
            .map_err(|e| format!("cannot resolve against {url}: {e}")),
        Some(Location::File(path)) => {
            let directory = path.parent().unwrap_or_else(|| Path::new(""));
            Ok(Location::File(absolutize(directory, Path::new(target))))
        }
        None => Ok(Location::File(absolutize(Path::new(""), Path::new(target)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn bundler() -> Bundler {
        Bundler::new(reqwest::Client::new(), true)
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn inline_schema_without_refs_is_unchanged() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "$ref": "#/$defs/a" } },
            "$defs": { "a": { "type": "string" } }
        });
        let bundled = bundler()
            .bundle(&SchemaReference::inline(schema.clone()))
            .await
            .unwrap();
        assert_eq!(bundled, schema);
    }

    #[tokio::test]
    async fn cross_file_refs_are_embedded() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "defs.json",
            r##"{
                "definitions": {
                    "name": { "$ref": "#/definitions/text" },
                    "text": { "type": "string", "minLength": 1 }
                }
            }"##,
        );
        let root = write(
            dir.path(),
            "root.json",
            r#"{
                "type": "object",
                "properties": {
                    "title": { "$ref": "./defs.json#/definitions/name" },
                    "tags": { "$ref": "defs.json#/definitions/text" }
                }
            }"#,
        );

        let bundled = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap();

        assert_eq!(
            bundled["properties"]["title"]["$ref"],
            "#/$defs/defs.json/definitions/name"
        );
        assert_eq!(
            bundled["properties"]["tags"]["$ref"],
            "#/$defs/defs.json/definitions/text"
        );
        assert_eq!(
            bundled["$defs"]["defs.json"]["definitions"]["name"]["$ref"],
            "#/$defs/defs.json/definitions/text",
            "internal refs of embedded documents are re-based"
        );
        assert_eq!(bundled["$defs"].as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn yaml_documents_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "common.yaml", "type: string\nenum: [a, b]\n");
        let root = write(
            dir.path(),
            "root.yml",
            "type: object\nproperties:\n  kind:\n    $ref: ./common.yaml\n",
        );

        let bundled = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap();

        assert_eq!(bundled["properties"]["kind"]["$ref"], "#/$defs/common.yaml");
        assert_eq!(bundled["$defs"]["common.yaml"]["enum"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn draft_07_roots_use_definitions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leaf.json", r#"{ "type": "integer" }"#);
        let root = write(
            dir.path(),
            "root.json",
            r#"{
                "$schema": "http://json-schema.org/draft-07/schema#",
                "properties": { "n": { "$ref": "leaf.json" } }
            }"#,
        );

        let bundled = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap();

        assert_eq!(bundled["properties"]["n"]["$ref"], "#/definitions/leaf.json");
        assert_eq!(bundled["definitions"]["leaf.json"]["type"], "integer");
        assert!(bundled.get("$defs").is_none());
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b.json",
            r#"{ "$id": "https://example.com/b.json", "properties": { "parent": { "$ref": "a.json" } } }"#,
        );
        let root = write(
            dir.path(),
            "a.json",
            r#"{ "properties": { "child": { "$ref": "b.json" } } }"#,
        );

        let bundled = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap();

        assert_eq!(bundled["properties"]["child"]["$ref"], "#/$defs/b.json");
        assert_eq!(
            bundled["$defs"]["b.json"]["properties"]["parent"]["$ref"], "#",
            "a reference back to the root points at the root"
        );
        assert!(bundled["$defs"]["b.json"].get("$id").is_none());
    }

    #[tokio::test]
    async fn same_file_names_get_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one/s.json", r#"{ "type": "string" }"#);
        write(dir.path(), "two/s.json", r#"{ "type": "number" }"#);
        let root = write(
            dir.path(),
            "root.json",
            r#"{ "anyOf": [ { "$ref": "one/s.json" }, { "$ref": "two/s.json" } ] }"#,
        );

        let bundled = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap();

        assert_eq!(bundled["anyOf"][0]["$ref"], "#/$defs/s.json");
        assert_eq!(bundled["anyOf"][1]["$ref"], "#/$defs/s.json-2");
        assert_eq!(bundled["$defs"]["s.json-2"]["type"], "number");
    }

    #[tokio::test]
    async fn data_keywords_are_not_rewritten() {
        let schema = json!({
            "const": { "$ref": "other.json" },
            "examples": [ { "$ref": "other.json" } ]
        });
        let bundled = bundler()
            .bundle(&SchemaReference::inline(schema.clone()))
            .await
            .unwrap();
        assert_eq!(bundled, schema);
    }

    #[tokio::test]
    async fn properties_named_like_data_keywords_are_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leaf.json", r#"{ "type": "integer" }"#);
        let root = write(
            dir.path(),
            "root.json",
            r#"{
                "properties": {
                    "default": { "$ref": "leaf.json" },
                    "enum": { "$ref": "leaf.json" },
                    "$ref": { "type": "string" }
                },
                "$defs": { "examples": { "$ref": "leaf.json" } },
                "default": { "$ref": "leaf.json" }
            }"#,
        );

        let bundled = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap();

        assert_eq!(bundled["properties"]["default"]["$ref"], "#/$defs/leaf.json");
        assert_eq!(bundled["properties"]["enum"]["$ref"], "#/$defs/leaf.json");
        assert_eq!(bundled["properties"]["$ref"], json!({ "type": "string" }));
        assert_eq!(bundled["$defs"]["examples"]["$ref"], "#/$defs/leaf.json");
        assert_eq!(bundled["$defs"]["leaf.json"]["type"], "integer");
        assert_eq!(bundled["default"]["$ref"], "leaf.json");

        let validator = crate::validate::SchemaValidator::new();
        let errors = validator
            .validate(&std::sync::Arc::new(bundled), &json!({ "default": "x", "enum": 3 }))
            .unwrap();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].instance_path, "/default");
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = bundler()
            .bundle(&SchemaReference::Path(dir.path().join("absent.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "bad.json", "{ not json");
        let err = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn non_schema_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "list.json", "[1, 2, 3]");
        let err = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn plain_name_fragments_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "defs.json", r#"{ "$defs": { "x": { "$anchor": "x" } } }"#);
        let root = write(
            dir.path(),
            "root.json",
            r#"{ "properties": { "a": { "$ref": "defs.json#x" } } }"#,
        );
        let err = bundler()
            .bundle(&SchemaReference::Path(root))
            .await
            .unwrap_err();
        assert!(
            matches!(err, LoadError::UnsupportedReference { ref reference, .. } if reference == "defs.json#x"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn remote_refs_respect_allow_remote() {
        let schema = json!({ "$ref": "https://example.com/remote.json" });
        let err = Bundler::new(reqwest::Client::new(), false)
            .bundle(&SchemaReference::inline(schema))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::RemoteDisabled { .. }), "got {err:?}");
    }

    #[test]
    fn relative_targets_follow_the_referencing_document() {
        let base = Location::Remote(Url::parse("https://example.com/schemas/root.json").unwrap());
        assert_eq!(
            resolve_target("../common/a.json", Some(&base)).unwrap(),
            Location::Remote(Url::parse("https://example.com/common/a.json").unwrap())
        );

        let base = Location::File(PathBuf::from("/schemas/root.json"));
        assert_eq!(
            resolve_target("./sub/../a.json", Some(&base)).unwrap(),
            Location::File(PathBuf::from("/schemas/a.json"))
        );
        assert_eq!(
            resolve_target("file:///etc/s.json", Some(&base)).unwrap(),
            Location::File(PathBuf::from("/etc/s.json"))
        );
        assert!(resolve_target("urn:example:thing", Some(&base)).is_err());
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("my schema@v1.json"), "my_schema_v1.json");
    }
}
