//! Error types for lineage construction and caller execution.

use thiserror::Error;

/// Boxed error returned by wrapped transformations and fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Lineage and caller errors
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Caller id already registered: {0}")]
    DuplicateId(String),

    #[error("Illegal input type for caller {caller}: expected {expected}, found {found}")]
    IllegalInputType {
        caller: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Transformation failed in caller {caller} (root input {root_input}): {source}")]
    Transformation {
        caller: String,
        root_input: String,
        #[source]
        source: BoxError,
    },

    #[error("Caller {0} is not resolved in this session")]
    UnresolvedCaller(String),
}

impl LineageError {
    pub(crate) fn transformation(
        caller: &str,
        root_input: &serde_json::Value,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Transformation {
            caller: caller.to_string(),
            root_input: root_input.to_string(),
            source: source.into(),
        }
    }
}

/// Short name of a JSON value's type, used in input type errors.
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
