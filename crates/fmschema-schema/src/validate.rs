//! # Structural Validation
//!
//! Compiles bundled schemas with the `jsonschema` crate and collects every
//! violation as a [`StructuralError`].
//!
//! Format keywords (`date`, `email`, `uri`, ...) are asserted. Schemas are
//! expected to be bundled already: any `$ref` the validator would need to
//! fetch is refused by an offline retriever and fails compilation.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ValidatorError;
use crate::reference::ByAddress;

/// One schema violation, before it is mapped onto source text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralError {
    /// JSON Pointer to the offending value, `""` for the root.
    pub instance_path: String,
    /// JSON Pointer to the failing keyword in the schema.
    pub schema_path: String,
    /// The failing keyword, e.g. `required`, `enum`, `type`.
    pub keyword: String,
    pub message: String,
    /// Keyword-specific parameters, e.g. `allowedValues` for `enum` and
    /// `missingProperty` for `required`. An empty object when there are none.
    pub params: Value,
}

/// Refuses every remote lookup. Bundled schemas never need one.
struct OfflineRetriever;

impl jsonschema::Retrieve for OfflineRetriever {
    fn retrieve(
        &self,
        uri: &jsonschema::Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("schema `{}` is not part of the bundle", uri.as_str()).into())
    }
}

/// Compile one schema.
///
/// # Errors
///
/// Returns [`ValidatorError::Compile`] for an invalid schema or an
/// unresolvable reference.
pub fn compile_schema(schema: &Value) -> Result<Validator, ValidatorError> {
    jsonschema::options()
        .should_validate_formats(true)
        .with_retriever(OfflineRetriever)
        .build(schema)
        .map_err(|e| ValidatorError::Compile {
            reason: e.to_string(),
        })
}

/// Every violation of `value` against `validator`, in emission order.
pub fn collect_errors(validator: &Validator, value: &Value) -> Vec<StructuralError> {
    validator
        .iter_errors(value)
        .map(|err| {
            let schema_path = err.schema_path.to_string();
            StructuralError {
                instance_path: err.instance_path.to_string(),
                keyword: keyword_of(&schema_path),
                params: params_of(&err.kind),
                message: err.to_string(),
                schema_path,
            }
        })
        .collect()
}

/// The last schema path segment names the keyword that failed.
fn keyword_of(schema_path: &str) -> String {
    schema_path
        .rsplit('/')
        .next()
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .unwrap_or_default()
}

fn params_of(kind: &ValidationErrorKind) -> Value {
    match kind {
        ValidationErrorKind::Enum { options } => {
            let allowed = match options {
                Value::Array(values) => values.clone(),
                other => vec![other.clone()],
            };
            json!({ "allowedValues": allowed })
        }
        ValidationErrorKind::Required { property } => json!({ "missingProperty": property }),
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            json!({ "unexpected": unexpected })
        }
        ValidationErrorKind::Format { format } => json!({ "format": format }),
        _ => Value::Object(Map::new()),
    }
}

/// Validates metadata against bundled schemas, compiling each distinct
/// schema once.
#[derive(Default)]
pub struct SchemaValidator {
    compiled: Mutex<HashMap<ByAddress<Value>, Arc<Validator>>>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("compiled", &self.compiled_len())
            .finish()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled schemas held.
    pub fn compiled_len(&self) -> usize {
        self.compiled.lock().len()
    }

    /// The compiled validator for `schema`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Compile`] if the schema does not compile.
    pub fn compile(&self, schema: &Arc<Value>) -> Result<Arc<Validator>, ValidatorError> {
        let key = ByAddress(Arc::clone(schema));
        if let Some(validator) = self.compiled.lock().get(&key) {
            return Ok(Arc::clone(validator));
        }
        let validator = Arc::new(compile_schema(schema)?);
        self.compiled.lock().insert(key, Arc::clone(&validator));
        Ok(validator)
    }

    /// Validate `value`, returning every violation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Compile`] if the schema does not compile.
    pub fn validate(
        &self,
        schema: &Arc<Value>,
        value: &Value,
    ) -> Result<Vec<StructuralError>, ValidatorError> {
        let validator = self.compile(schema)?;
        Ok(collect_errors(&validator, value))
    }
}
