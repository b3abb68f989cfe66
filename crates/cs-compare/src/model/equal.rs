use serde_json::Value;

use super::{Agreement, ComparisonModel};
use crate::error::CompareError;

/// Exact-match overlap between two outputs.
///
/// `intersection / (only_a + only_b + intersection)`, where `intersection`
/// counts elements of A that occur in B. Elements compare structurally, so
/// nested arrays match by content.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualComparisonModel;

impl EqualComparisonModel {
    pub fn new() -> Self {
        Self
    }
}

impl ComparisonModel for EqualComparisonModel {
    fn name(&self) -> &'static str {
        "equal"
    }

    fn is_multiple_comparison(&self) -> bool {
        false
    }

    fn run(&self, a: &[Value], b: &[Value]) -> Result<Agreement, CompareError> {
        if a.is_empty() && b.is_empty() {
            return Ok(Agreement::Score(1.0));
        }
        let intersection = a.iter().filter(|x| b.contains(x)).count();
        let only_a = a.len() - intersection;
        let only_b = b.iter().filter(|y| !a.contains(y)).count();
        let total = only_a + only_b + intersection;
        Ok(Agreement::Score(intersection as f64 / total as f64))
    }
}
