//! # Schema Resolution
//!
//! Decides which schema applies to a document. First match wins:
//!
//! 1. **Inline override.** A string `$schema` key in the frontmatter. An
//!    `https://` value is used as a URL; anything else is a path relative to
//!    the document's directory.
//! 2. **Global default.** The `defaultSchema` rule option: a path/URL string
//!    or an inline schema object.
//! 3. Otherwise resolution fails with [`ResolveError::NotFound`].
//!
//! A `defaultSchema` that is present but neither a string nor an object
//! (including `null`) is [`ResolveError::Malformed`], which is reported
//! differently from an absent one. The malformed check runs first, so a bad
//! default is reported even when the document carries its own `$schema`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use crate::error::ResolveError;
use crate::reference::{absolutize, SchemaReference, REMOTE_PREFIX};

/// Frontmatter key holding the inline schema override.
pub const SCHEMA_KEY: &str = "$schema";

/// The configured global default, classified once when options are parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DefaultSchema {
    /// No `defaultSchema` option.
    #[default]
    Absent,
    /// A usable path, URL, or inline schema object.
    Configured(SchemaReference),
    /// Present but unusable; carries a description for the diagnostic.
    Malformed(String),
}

/// Typed view of the host's opaque rule options.
///
/// Parse once per configuration and reuse it for every document: an inline
/// `defaultSchema` object keeps its identity, so the loader bundles it once.
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    default_schema: DefaultSchema,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRuleOptions {
    #[serde(default, deserialize_with = "deserialize_present")]
    default_schema: Option<Value>,
}

/// Keeps an explicit `null` distinguishable from a missing key.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RuleOptions {
    /// Classify the host's options value. Never fails: problems are recorded
    /// as [`DefaultSchema::Malformed`] and surface per document.
    pub fn from_value(options: Option<&Value>) -> Self {
        let default_schema = match options {
            None | Some(Value::Null) => DefaultSchema::Absent,
            Some(value @ Value::Object(_)) => {
                match RawRuleOptions::deserialize(value) {
                    Ok(raw) => classify_default(raw.default_schema),
                    Err(e) => DefaultSchema::Malformed(format!("invalid rule options: {e}")),
                }
            }
            Some(other) => DefaultSchema::Malformed(format!(
                "rule options must be an object, found {}",
                json_type(other)
            )),
        };
        Self { default_schema }
    }

    /// Options with a given default schema.
    pub fn with_default_schema(reference: SchemaReference) -> Self {
        Self {
            default_schema: DefaultSchema::Configured(reference),
        }
    }

    pub fn default_schema(&self) -> &DefaultSchema {
        &self.default_schema
    }

    /// The global default reference, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Malformed`] when the option is present but
    /// unusable.
    pub fn global_default(&self) -> Result<Option<SchemaReference>, ResolveError> {
        match &self.default_schema {
            DefaultSchema::Absent => Ok(None),
            DefaultSchema::Configured(reference) => Ok(Some(reference.clone())),
            DefaultSchema::Malformed(reason) => Err(ResolveError::Malformed {
                reason: reason.clone(),
            }),
        }
    }
}

fn classify_default(value: Option<Value>) -> DefaultSchema {
    match value {
        None => DefaultSchema::Absent,
        Some(Value::String(raw)) if raw.is_empty() => DefaultSchema::Absent,
        Some(Value::String(raw)) => match SchemaReference::from_location(&raw) {
            Ok(reference) => DefaultSchema::Configured(reference),
            Err(ResolveError::Malformed { reason } | ResolveError::Unlocatable { reason, .. }) => {
                DefaultSchema::Malformed(reason)
            }
            Err(ResolveError::NotFound) => DefaultSchema::Absent,
        },
        Some(schema @ Value::Object(_)) => {
            DefaultSchema::Configured(SchemaReference::Inline(Arc::new(schema)))
        }
        Some(other) => DefaultSchema::Malformed(format!(
            "`defaultSchema` must be a path, URL or schema object, found {}",
            json_type(&other)
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read the inline `$schema` override from parsed frontmatter.
///
/// Non-string and empty values are ignored. Relative paths resolve against
/// the directory containing `document_path`.
///
/// # Errors
///
/// Returns [`ResolveError::Unlocatable`] for an `https://` value that is not
/// a valid URL.
pub fn inline_reference(
    metadata: &Value,
    document_path: &Path,
) -> Result<Option<SchemaReference>, ResolveError> {
    let Some(raw) = metadata.get(SCHEMA_KEY).and_then(Value::as_str) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.starts_with(REMOTE_PREFIX) {
        return Url::parse(raw)
            .map(|url| Some(SchemaReference::Url(url)))
            .map_err(|e| ResolveError::Unlocatable {
                schema_path: raw.to_string(),
                reason: e.to_string(),
            });
    }
    let document_dir = document_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(Some(SchemaReference::Path(absolutize(
        document_dir,
        Path::new(raw),
    ))))
}

/// Apply the full precedence policy for one document.
///
/// # Errors
///
/// [`ResolveError::Malformed`] for an unusable default,
/// [`ResolveError::Unlocatable`] for an inline URL that does not parse, and
/// [`ResolveError::NotFound`] when nothing applies.
pub fn resolve(
    options: &RuleOptions,
    metadata: &Value,
    document_path: &Path,
) -> Result<SchemaReference, ResolveError> {
    let global = options.global_default()?;
    let inline = inline_reference(metadata, document_path)?;
    let source = if inline.is_some() { "inline" } else { "default" };
    let reference = inline.or(global).ok_or(ResolveError::NotFound)?;
    tracing::debug!(
        document = %document_path.display(),
        schema = %reference,
        source,
        "resolved frontmatter schema"
    );
    Ok(reference)
}
