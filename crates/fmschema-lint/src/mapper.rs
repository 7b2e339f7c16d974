//! # Diagnostic Mapping
//!
//! Turns [`StructuralError`]s into source-anchored [`Diagnostic`]s.
//!
//! Each error's instance path is walked through the metadata AST. When a
//! node is found, its start position becomes the diagnostic's (zero-width)
//! range; otherwise the range falls back to line 1, column 1. `enum`
//! violations on a located node also get one fix suggestion per allowed
//! value, each replacing the node's full text.

use fmschema_core::{
    ByteSpan, Diagnostic, DiagnosticKind, FixSuggestion, LineIndex, SourceRange, TextEdit,
};
use fmschema_schema::StructuralError;
use serde_json::Value;

use crate::ast::MetadataNode;

/// Path segments of a JSON Pointer instance path.
///
/// The root path `""` yields a single empty segment, which never names a
/// node, so root-level errors use the fallback range.
pub fn instance_path_segments(instance_path: &str) -> Vec<String> {
    instance_path
        .strip_prefix('/')
        .unwrap_or(instance_path)
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// One diagnostic per error, in the same order.
pub fn map_errors(
    errors: &[StructuralError],
    ast: &MetadataNode,
    lines: &LineIndex,
) -> Vec<Diagnostic> {
    errors.iter().map(|error| map_error(error, ast, lines)).collect()
}

fn map_error(error: &StructuralError, ast: &MetadataNode, lines: &LineIndex) -> Diagnostic {
    let span = ast
        .get_in(&instance_path_segments(&error.instance_path))
        .and_then(|node| node.span);
    let range = span
        .map(|span| SourceRange::point(lines.position(span.start)))
        .unwrap_or_default();

    let at = if error.instance_path.is_empty() {
        "root"
    } else {
        error.instance_path.as_str()
    };
    let diagnostic = Diagnostic::new(
        DiagnosticKind::ValidationViolation,
        format!("{} at {at}", error.message),
        range,
    )
    .with_data(error.params.clone());

    match span {
        Some(span) if error.keyword == "enum" => {
            diagnostic.with_suggestions(enum_suggestions(&error.params, span))
        }
        _ => diagnostic,
    }
}

fn enum_suggestions(params: &Value, span: ByteSpan) -> Vec<FixSuggestion> {
    let Some(allowed) = params.get("allowedValues").and_then(Value::as_array) else {
        return Vec::new();
    };
    allowed
        .iter()
        .map(|value| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            FixSuggestion {
                description: format!("Replace with \"{text}\""),
                edit: TextEdit::new(span, text),
            }
        })
        .collect()
}
