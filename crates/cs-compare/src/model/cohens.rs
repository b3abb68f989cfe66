use serde_json::Value;

use super::{Agreement, ComparisonModel, as_items, ensure_aligned};
use crate::error::CompareError;

/// Cohen's kappa for presence or absence of one label.
///
/// Each item reduces to whether the rater's output contains `label`; the
/// 2x2 contingency over all items gives observed (`P0`) and chance (`Pe`)
/// agreement, `kappa = (P0 - Pe) / (1 - Pe)`.
#[derive(Debug, Clone)]
pub struct CohensComparisonModel {
    label: Value,
}

impl CohensComparisonModel {
    pub fn new(label: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
        }
    }

    fn present(&self, output: &Value) -> bool {
        as_items(output).contains(&self.label)
    }
}

/// Presence counts over paired items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Contingency {
    both: u64,
    neither: u64,
    only_b: u64,
    only_a: u64,
}

impl Contingency {
    fn total(&self) -> u64 {
        self.both + self.neither + self.only_a + self.only_b
    }
}

impl ComparisonModel for CohensComparisonModel {
    fn name(&self) -> &'static str {
        "cohens_kappa"
    }

    fn is_multiple_comparison(&self) -> bool {
        true
    }

    fn run(&self, a: &[Value], b: &[Value]) -> Result<Agreement, CompareError> {
        ensure_aligned(self.name(), a, b)?;

        let mut table = Contingency::default();
        for (x, y) in a.iter().zip(b) {
            match (self.present(x), self.present(y)) {
                (true, true) => table.both += 1,
                (false, false) => table.neither += 1,
                (false, true) => table.only_b += 1,
                (true, false) => table.only_a += 1,
            }
        }

        let n = table.total();
        if n == 0 {
            return Ok(Agreement::Score(1.0));
        }

        // (TP+FN)(TP+FP) + (TN+FN)(TN+FP), kept integral so Pe == 1 is exact
        let chance = (table.both + table.only_a) * (table.both + table.only_b)
            + (table.neither + table.only_a) * (table.neither + table.only_b);
        let observed = table.both + table.neither;

        if chance == n * n {
            let kappa = if observed == n { 1.0 } else { 0.0 };
            return Ok(Agreement::Score(kappa));
        }

        let p0 = observed as f64 / n as f64;
        let pe = chance as f64 / (n * n) as f64;
        Ok(Agreement::Score((p0 - pe) / (1.0 - pe)))
    }
}
