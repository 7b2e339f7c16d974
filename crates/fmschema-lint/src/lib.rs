//! # fmschema-lint: Frontmatter Schema Lint Rule
//!
//! Validates the YAML frontmatter of a document against a JSON Schema and
//! reports each violation at its exact place in the source.
//!
//! - [`frontmatter`]: finds the `---` block and parses it into a value plus
//!   a span-carrying [`MetadataNode`] tree, behind the [`MetadataParser`]
//!   seam.
//! - [`locate`]: the span locator that builds that tree.
//! - [`mapper`]: turns structural errors into [`Diagnostic`]s, with
//!   replacement suggestions for `enum` violations.
//! - [`pipeline`]: [`FrontmatterSchemaRule`], which runs resolve, load,
//!   validate and map for one document at a time.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use fmschema_lint::{DocumentInput, FrontmatterSchemaRule};
//! use fmschema_schema::{LoaderConfig, RuleOptions};
//! use serde_json::json;
//!
//! let rule = FrontmatterSchemaRule::with_loader(LoaderConfig::from_env())?;
//! let options = RuleOptions::from_value(Some(&json!({ "defaultSchema": "./post.schema.json" })));
//! let text = "---\ntitle: Hello\n---\n";
//! for diagnostic in rule.check(&DocumentInput::new(Path::new("/docs/post.md"), text, &options))? {
//!     println!("{diagnostic}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`Diagnostic`]: fmschema_core::Diagnostic

pub mod ast;
pub mod frontmatter;
pub mod locate;
pub mod mapper;
pub mod pipeline;

pub use ast::{MappingEntry, MetadataNode, NodeKind};
pub use frontmatter::{extract, MetadataParser, ParsedMetadata, SyntaxError, YamlFrontmatterParser};
pub use mapper::{instance_path_segments, map_errors};
pub use pipeline::{DocumentInput, FrontmatterSchemaRule, PipelineError};
