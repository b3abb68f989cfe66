use thiserror::Error;

/// Comparison errors
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Responses do not share a root input: {left} vs {right}")]
    MismatchedInput { left: String, right: String },

    #[error("Model {model} cannot be used here: expected a {expected} model")]
    WrongModelKind {
        model: &'static str,
        expected: &'static str,
    },

    #[error("No root input is shared between the two response lists")]
    NoMatch,
}
