//! # Diagnostics
//!
//! The unit of output handed back to the host linting engine. One
//! [`Diagnostic`] is produced per schema violation, or exactly one for a
//! document whose schema could not be resolved, loaded, or whose metadata
//! could not be parsed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::position::{ByteSpan, SourceRange};

/// What a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// No schema applies to the document, or the applicable one failed to load.
    SchemaNotFound,
    /// The configured default schema is neither a location nor a schema object.
    SchemaMalformed,
    /// The metadata block is not valid YAML.
    InvalidSyntax,
    /// The metadata violates a schema rule.
    ValidationViolation,
}

impl DiagnosticKind {
    /// Stable identifier hosts can use to look up or filter messages.
    pub fn message_id(&self) -> &'static str {
        match self {
            Self::SchemaNotFound => "schemaNotFound",
            Self::SchemaMalformed => "schemaMalformed",
            Self::InvalidSyntax => "yamlSyntaxError",
            Self::ValidationViolation => "validation",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_id())
    }
}

/// A replacement of a byte range in the original document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub span: ByteSpan,
    pub text: String,
}

impl TextEdit {
    pub fn new(span: ByteSpan, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }

    /// Apply the edit to `source`, returning the edited text.
    ///
    /// Returns `None` if the span does not fall on character boundaries
    /// within `source`.
    pub fn apply(&self, source: &str) -> Option<String> {
        let head = source.get(..self.span.start)?;
        let tail = source.get(self.span.end..)?;
        let mut out = String::with_capacity(head.len() + self.text.len() + tail.len());
        out.push_str(head);
        out.push_str(&self.text);
        out.push_str(tail);
        Some(out)
    }
}

/// A ready-to-apply fix offered alongside a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSuggestion {
    /// Human-readable description, e.g. `Replace with "Book"`.
    pub description: String,
    pub edit: TextEdit,
}

/// A source-anchored report of one problem in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub range: SourceRange,
    /// Structured context, e.g. the validator's keyword parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<FixSuggestion>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, range: SourceRange) -> Self {
        Self {
            kind,
            message: message.into(),
            range,
            data: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<FixSuggestion>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.range.start, self.message, self.kind)
    }
}
