//! # fmschema-core: Foundational Types
//!
//! Shared vocabulary for the frontmatter schema validation workspace.
//! Every other crate depends on this one; it depends on nothing internal.
//!
//! ## Modules
//!
//! - [`position`]: 1-based line/column positions, byte spans into the
//!   document text, and the [`LineIndex`] that converts one into the other.
//! - [`diagnostic`]: the externally visible output of the pipeline:
//!   [`Diagnostic`], [`FixSuggestion`] and the [`TextEdit`] a host applies
//!   when a suggestion is accepted.
//!
//! ## Crate Policy
//!
//! - Offsets are byte offsets into the full document text, never into the
//!   extracted metadata block.
//! - Columns count Unicode scalar values, not bytes.

pub mod diagnostic;
pub mod position;

pub use diagnostic::{Diagnostic, DiagnosticKind, FixSuggestion, TextEdit};
pub use position::{ByteSpan, LineIndex, Position, SourceRange};
