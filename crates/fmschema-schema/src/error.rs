//! # Error Types
//!
//! One enum per stage. Resolution and load errors end up as diagnostics;
//! validator errors propagate to the host.

use std::time::Duration;

use thiserror::Error;

/// Why no schema reference could be determined for a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Neither an inline `$schema` nor a default schema is configured.
    #[error("no schema applies: the frontmatter has no `$schema` and no default schema is configured")]
    NotFound,

    /// A schema was configured but cannot be interpreted as one.
    #[error("schema is malformed: {reason}")]
    Malformed {
        /// Human-readable description of what was found.
        reason: String,
    },

    /// The document names a schema that cannot be turned into a location,
    /// such as an `https://` value that does not parse as a URL.
    #[error("schema `{schema_path}` cannot be located: {reason}")]
    Unlocatable {
        /// The value as written in the frontmatter.
        schema_path: String,
        reason: String,
    },
}

/// Failure to fetch or bundle a schema.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A schema file could not be read.
    #[error("cannot read schema {location}: {source}")]
    Read {
        location: String,
        source: std::io::Error,
    },

    /// A schema document is not valid JSON/YAML, or not a schema at all.
    #[error("invalid schema document {location}: {reason}")]
    Parse { location: String, reason: String },

    /// The HTTP request for a remote schema failed.
    #[error("request for {location} failed: {source}")]
    Http {
        location: String,
        source: reqwest::Error,
    },

    /// The remote server answered with a non-success status.
    #[error("{location} responded with HTTP {status}")]
    Status { location: String, status: u16 },

    /// Remote loading is switched off in [`crate::LoaderConfig`].
    #[error("remote schema loading is disabled; refusing to fetch {location}")]
    RemoteDisabled { location: String },

    /// A `$ref` that the bundler cannot rewrite.
    #[error("unsupported reference `{reference}` in {location}: {reason}")]
    UnsupportedReference {
        reference: String,
        location: String,
        reason: String,
    },

    /// Bundling would embed an unreasonable number of documents.
    #[error("bundling {location} exceeded {limit} referenced documents")]
    TooManyDocuments { location: String, limit: usize },

    /// The load did not finish within the configured timeout.
    #[error("loading {location} timed out after {timeout:?}")]
    TimedOut { location: String, timeout: Duration },

    /// The worker thread could not be started or has gone away.
    #[error("schema loader worker is unavailable: {reason}")]
    WorkerUnavailable { reason: String },
}

/// Failure to turn a bundled schema into a validator.
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("failed to compile schema: {reason}")]
    Compile { reason: String },
}
