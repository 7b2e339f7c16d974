//! # Lint Pipeline
//!
//! [`FrontmatterSchemaRule`] runs once per document. A document without a
//! frontmatter block gets no diagnostics at all; otherwise:
//!
//! 1. Check the configured default schema. A malformed one yields a single
//!    `schemaMalformed` diagnostic.
//! 2. Parse the frontmatter. Invalid YAML yields a single `yamlSyntaxError`
//!    diagnostic at the error location.
//! 3. Resolve the schema: the inline `$schema` wins over the default. With
//!    neither, a single `schemaNotFound` diagnostic.
//! 4. Load and bundle it. Failure, or an inline `$schema` that is not a
//!    usable location, yields a single `schemaNotFound` diagnostic naming
//!    what was tried.
//! 5. Validate, then map every error onto the source.
//!
//! Standalone diagnostics (steps 1, 3 and 4) are anchored at the host's
//! metadata block range if given, else at the document start. A schema
//! that does not compile is returned as [`PipelineError`], not as a
//! diagnostic.

use std::path::Path;

use fmschema_core::{Diagnostic, DiagnosticKind, SourceRange};
use fmschema_schema::{
    resolve, LoadError, LoaderConfig, ResolveError, RuleOptions, SchemaLoader, SchemaSource,
    SchemaValidator, ValidatorError,
};
use serde_json::json;
use thiserror::Error;

use crate::frontmatter::{MetadataParser, YamlFrontmatterParser};
use crate::mapper::map_errors;

/// Message for a document with no applicable schema.
pub const SCHEMA_NOT_FOUND: &str = "Schema not found for frontmatter";
/// Message for invalid frontmatter YAML.
pub const YAML_SYNTAX_ERROR: &str = "Invalid YAML frontmatter syntax.";

/// Faults that are not per-document findings.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] ValidatorError),
}

/// One document as handed over by the host.
#[derive(Debug, Clone, Copy)]
pub struct DocumentInput<'a> {
    /// Path of the document; inline `$schema` paths resolve against its
    /// directory.
    pub file_path: &'a Path,
    /// Full document text.
    pub text: &'a str,
    pub options: &'a RuleOptions,
    /// Range of the metadata block, if the host knows it.
    pub block_range: Option<SourceRange>,
}

impl<'a> DocumentInput<'a> {
    pub fn new(file_path: &'a Path, text: &'a str, options: &'a RuleOptions) -> Self {
        Self {
            file_path,
            text,
            options,
            block_range: None,
        }
    }

    pub fn with_block_range(mut self, range: SourceRange) -> Self {
        self.block_range = Some(range);
        self
    }

    fn anchor(&self) -> SourceRange {
        self.block_range.unwrap_or_default()
    }
}

/// The frontmatter schema lint rule.
#[derive(Debug)]
pub struct FrontmatterSchemaRule<S, P = YamlFrontmatterParser> {
    source: S,
    parser: P,
    validator: SchemaValidator,
}

impl FrontmatterSchemaRule<SchemaLoader> {
    /// A rule backed by its own schema loader.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::WorkerUnavailable`] if the loader cannot start.
    pub fn with_loader(config: LoaderConfig) -> Result<Self, LoadError> {
        Ok(Self::new(SchemaLoader::new(config)?))
    }
}

impl<S: SchemaSource> FrontmatterSchemaRule<S> {
    pub fn new(source: S) -> Self {
        Self::with_parser(source, YamlFrontmatterParser)
    }
}

impl<S: SchemaSource, P: MetadataParser> FrontmatterSchemaRule<S, P> {
    pub fn with_parser(source: S, parser: P) -> Self {
        Self {
            source,
            parser,
            validator: SchemaValidator::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Diagnostics for one document, in validator order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Compile`] when the loaded schema does not
    /// compile.
    pub fn check(&self, input: &DocumentInput<'_>) -> Result<Vec<Diagnostic>, PipelineError> {
        let parsed = self.parser.parse(input.text);
        if matches!(&parsed, Ok(parsed) if parsed.block.is_none()) {
            tracing::trace!(document = %input.file_path.display(), "no frontmatter block");
            return Ok(Vec::new());
        }

        if let Err(ResolveError::Malformed { reason }) = input.options.global_default() {
            return Ok(vec![malformed(input, reason)]);
        }

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(document = %input.file_path.display(), error = %e, "frontmatter does not parse");
                return Ok(vec![Diagnostic::new(
                    DiagnosticKind::InvalidSyntax,
                    YAML_SYNTAX_ERROR,
                    SourceRange::point(e.position),
                )
                .with_data(json!({ "reason": e.message }))]);
            }
        };

        let reference = match resolve(input.options, &parsed.value, input.file_path) {
            Ok(reference) => reference,
            Err(ResolveError::NotFound) => {
                return Ok(vec![Diagnostic::new(
                    DiagnosticKind::SchemaNotFound,
                    SCHEMA_NOT_FOUND,
                    input.anchor(),
                )]);
            }
            Err(ResolveError::Malformed { reason }) => return Ok(vec![malformed(input, reason)]),
            Err(ResolveError::Unlocatable {
                schema_path,
                reason,
            }) => {
                tracing::debug!(document = %input.file_path.display(), schema = %schema_path, %reason, "inline schema cannot be located");
                return Ok(vec![not_found_at(input, &schema_path)]);
            }
        };

        let Some(schema) = self.source.load(&reference) else {
            return Ok(vec![not_found_at(input, &reference.display_name())]);
        };

        let errors = self.validator.validate(&schema, &parsed.value)?;
        tracing::debug!(
            document = %input.file_path.display(),
            schema = %reference,
            violations = errors.len(),
            "validated frontmatter"
        );
        Ok(map_errors(&errors, &parsed.ast, &parsed.lines))
    }
}

fn not_found_at(input: &DocumentInput<'_>, schema_path: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::SchemaNotFound,
        format!("{SCHEMA_NOT_FOUND} at \"{schema_path}\""),
        input.anchor(),
    )
    .with_data(json!({ "schemaPath": schema_path }))
}

fn malformed(input: &DocumentInput<'_>, reason: String) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::SchemaMalformed,
        format!("Schema is malformed: {reason}"),
        input.anchor(),
    )
    .with_data(json!({ "reason": reason }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmschema_core::Position;
    use fmschema_schema::SchemaReference;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Serves one fixed schema and records what was asked for.
    #[derive(Default)]
    struct Recording {
        schema: Option<Arc<Value>>,
        requests: Mutex<Vec<SchemaReference>>,
    }

    impl Recording {
        fn serving(schema: Value) -> Self {
            Self {
                schema: Some(Arc::new(schema)),
                requests: Mutex::default(),
            }
        }
    }

    impl SchemaSource for Recording {
        fn load(&self, reference: &SchemaReference) -> Option<Arc<Value>> {
            self.requests.lock().push(reference.clone());
            self.schema.clone()
        }
    }

    fn check(source: &Recording, options: &RuleOptions, text: &str) -> Vec<Diagnostic> {
        let rule = FrontmatterSchemaRule::new(source);
        let path = PathBuf::from("/docs/a.md");
        rule.check(&DocumentInput::new(&path, text, options)).unwrap()
    }

    #[test]
    fn no_schema_anywhere_is_not_found_without_loading() {
        let source = Recording::default();
        let diagnostics = check(&source, &RuleOptions::default(), "---\ntitle: x\n---\n");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SchemaNotFound);
        assert_eq!(diagnostics[0].message, SCHEMA_NOT_FOUND);
        assert_eq!(diagnostics[0].range, SourceRange::document_start());
        assert!(source.requests.lock().is_empty());
    }

    #[test]
    fn malformed_default_short_circuits() {
        let source = Recording::default();
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": 42 })));
        let diagnostics = check(&source, &options, "---\n$schema: ./s.json\n---\n");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SchemaMalformed);
        assert!(diagnostics[0].message.starts_with("Schema is malformed"));
        assert!(source.requests.lock().is_empty());
    }

    #[test]
    fn malformed_default_beats_syntax_error() {
        let source = Recording::default();
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": null })));
        let diagnostics = check(&source, &options, "---\nbad: [\n---\n");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SchemaMalformed);
    }

    #[test]
    fn syntax_error_is_single_diagnostic() {
        let source = Recording::serving(json!({}));
        let options = RuleOptions::with_default_schema(SchemaReference::inline(json!({})));
        let diagnostics = check(&source, &options, "---\ntitle: ok\nbad: [a, b\n---\n");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::InvalidSyntax);
        assert_eq!(diagnostics[0].message, YAML_SYNTAX_ERROR);
        assert!(diagnostics[0].range.start.line >= 2);
        assert!(source.requests.lock().is_empty());
    }

    #[test]
    fn inline_schema_wins_over_default() {
        let source = Recording::serving(json!({}));
        let options = RuleOptions::with_default_schema(SchemaReference::Path("/global.json".into()));
        let diagnostics = check(&source, &options, "---\n$schema: ./local.json\n---\n");

        assert!(diagnostics.is_empty());
        assert_eq!(
            *source.requests.lock(),
            [SchemaReference::Path(PathBuf::from("/docs/local.json"))]
        );
    }

    #[test]
    fn https_inline_schema_is_requested_as_url() {
        let source = Recording::serving(json!({}));
        check(
            &source,
            &RuleOptions::default(),
            "---\n$schema: https://example.com/s.json\n---\n",
        );
        assert_eq!(
            source.requests.lock()[0].to_string(),
            "https://example.com/s.json"
        );
    }

    #[test]
    fn failed_load_names_the_schema() {
        let source = Recording::default();
        let diagnostics = check(&source, &RuleOptions::default(), "---\n$schema: ./gone.json\n---\n");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SchemaNotFound);
        assert_eq!(
            diagnostics[0].message,
            "Schema not found for frontmatter at \"/docs/gone.json\""
        );
        assert_eq!(diagnostics[0].data, Some(json!({ "schemaPath": "/docs/gone.json" })));
    }

    #[test]
    fn failed_inline_object_load_is_reported_as_inlined() {
        let source = Recording::default();
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": { "type": "object" } })));
        let diagnostics = check(&source, &options, "---\ntitle: x\n---\n");
        assert_eq!(diagnostics[0].data, Some(json!({ "schemaPath": "<inlined>" })));
    }

    #[test]
    fn standalone_diagnostics_use_host_block_range() {
        let source = Recording::default();
        let rule = FrontmatterSchemaRule::new(&source);
        let options = RuleOptions::default();
        let block = SourceRange::new(Position::new(1, 1), Position::new(3, 4));
        let input = DocumentInput::new(Path::new("/docs/a.md"), "---\na: 1\n---\n", &options)
            .with_block_range(block);

        let diagnostics = rule.check(&input).unwrap();
        assert_eq!(diagnostics[0].range, block);
    }

    #[test]
    fn required_properties_are_all_reported_at_document_start() {
        let source = Recording::serving(json!({
            "type": "object",
            "required": ["title", "foo"],
            "properties": {
                "title": { "type": "string" },
                "foo": { "type": "string" }
            }
        }));
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": "schema.json" })));
        let diagnostics = check(&source, &options, "---\n---\n");

        assert_eq!(diagnostics.len(), 2);
        for d in &diagnostics {
            assert_eq!(d.kind, DiagnosticKind::ValidationViolation);
            assert_eq!(d.range, SourceRange::document_start());
            assert!(d.message.ends_with(" at root"), "{}", d.message);
        }
    }

    #[test]
    fn uncompilable_schema_is_a_hard_error() {
        let source = Recording::serving(json!({ "type": 12 }));
        let rule = FrontmatterSchemaRule::new(&source);
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": "schema.json" })));
        let result = rule.check(&DocumentInput::new(Path::new("/docs/a.md"), "---\na: 1\n---\n", &options));
        assert!(matches!(result, Err(PipelineError::Compile(_))));
    }

    #[test]
    fn unparseable_inline_url_is_not_found_with_its_value() {
        let source = Recording::serving(json!({}));
        let diagnostics = check(&source, &RuleOptions::default(), "---\n$schema: \"https://\"\n---\n");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SchemaNotFound);
        assert_eq!(diagnostics[0].message, "Schema not found for frontmatter at \"https://\"");
        assert_eq!(diagnostics[0].data, Some(json!({ "schemaPath": "https://" })));
        assert!(source.requests.lock().is_empty());
    }

    #[test]
    fn document_without_frontmatter_is_skipped() {
        let source = Recording::serving(json!({ "type": "object", "required": ["title"] }));
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": "schema.json" })));
        assert!(check(&source, &options, "# Just a body\n").is_empty());

        let malformed = RuleOptions::from_value(Some(&json!({ "defaultSchema": 42 })));
        assert!(check(&source, &malformed, "# Just a body\n").is_empty());
        assert!(source.requests.lock().is_empty());
    }

    #[test]
    fn empty_block_still_validates_as_empty_object() {
        let source = Recording::serving(json!({ "type": "object", "required": ["title"] }));
        let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": "schema.json" })));
        let diagnostics = check(&source, &options, "---\n---\n\n# Body\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "\"title\" is a required property at root");
    }
}
