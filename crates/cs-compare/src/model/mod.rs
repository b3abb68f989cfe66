//! Comparison models.
//!
//! Pairwise models compare the two outputs of a single pair of responses,
//! each coerced to an array of elements. Multi-item models compare two
//! aligned sequences of outputs, one entry per paired item.

mod cohens;
mod distance;
mod equal;
mod krippendorff;

pub use cohens::CohensComparisonModel;
pub use distance::{DistanceComparisonModel, WeightFn};
pub use equal::EqualComparisonModel;
pub use krippendorff::{KrippendorffsComparisonModel, LabelWeightFn};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompareError;

/// Outcome of a comparison.
///
/// Krippendorff's alpha has no value when expected agreement is total but
/// observed agreement is not; that case is `Undefined` rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Agreement {
    Score(f64),
    Undefined,
}

impl Agreement {
    pub fn score(self) -> Option<f64> {
        match self {
            Agreement::Score(s) => Some(s),
            Agreement::Undefined => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, Agreement::Undefined)
    }
}

impl From<Option<f64>> for Agreement {
    fn from(score: Option<f64>) -> Self {
        score.map_or(Agreement::Undefined, Agreement::Score)
    }
}

impl From<Agreement> for Option<f64> {
    fn from(agreement: Agreement) -> Self {
        agreement.score()
    }
}

impl core::fmt::Display for Agreement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Agreement::Score(s) => write!(f, "{:.3}", s),
            Agreement::Undefined => write!(f, "undefined"),
        }
    }
}

/// A strategy reducing two raters' outputs to one agreement score.
pub trait ComparisonModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// `false` for pairwise models, `true` for models over aligned item lists.
    fn is_multiple_comparison(&self) -> bool;

    fn run(&self, a: &[Value], b: &[Value]) -> Result<Agreement, CompareError>;
}

/// Coerce an output to its elements; a non-array value is one element.
pub fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

pub(crate) fn ensure_aligned(model: &str, a: &[Value], b: &[Value]) -> Result<(), CompareError> {
    if a.len() != b.len() {
        return Err(CompareError::Validation(format!(
            "{model} needs aligned items: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}
