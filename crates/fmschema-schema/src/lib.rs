//! # fmschema-schema: Schema Resolution, Loading & Validation
//!
//! Everything between "which schema applies to this document?" and "here are
//! the raw structural errors":
//!
//! - [`resolve`]: the three-tier precedence policy (inline `$schema`, then
//!   the configured `defaultSchema`, then failure) and the typed
//!   [`RuleOptions`] parsed from the host's opaque configuration.
//! - [`reference`]: [`SchemaReference`]: inline object, filesystem path, or
//!   `https://` URL.
//! - [`bundle`]: dereferences external `$ref`s into one self-contained
//!   schema document.
//! - [`loader`]: [`SchemaLoader`], a blocking facade over an async worker
//!   thread that bundles schemas, with a per-reference cache.
//! - [`validate`]: compiles bundled schemas with the `jsonschema` crate and
//!   collects every [`StructuralError`].
//!
//! ## Crate Policy
//!
//! - Load failures never escape as errors from [`SchemaSource::load`]; they
//!   are logged and reported as an absent schema.
//! - Compile failures do escape: a schema that does not compile is a
//!   configuration bug, not a per-document condition.
//! - The validator never touches the network. Remote documents are fetched
//!   only by the loader worker, during bundling.

pub mod bundle;
pub mod error;
pub mod loader;
pub mod reference;
pub mod resolve;
pub mod validate;

pub use error::{LoadError, ResolveError, ValidatorError};
pub use loader::{LoaderConfig, SchemaLoader, SchemaSource};
pub use reference::SchemaReference;
pub use resolve::{inline_reference, resolve, DefaultSchema, RuleOptions, SCHEMA_KEY};
pub use validate::{SchemaValidator, StructuralError};
