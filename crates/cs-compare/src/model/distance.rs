use std::sync::Arc;

use serde_json::Value;

use super::{Agreement, ComparisonModel};
use crate::error::CompareError;

/// Weight of matching an element of the longer output with one of the shorter.
pub type WeightFn = dyn Fn(&Value, &Value) -> f64 + Send + Sync;

/// Distance-weighted match over an ordered scale.
///
/// Elements equal to one in the shorter output are paired first. Every other
/// element of the longer output then takes, in order, the best still-unused
/// element of the shorter output, the earliest one on ties; the score is the
/// mean weight over the longer output. That second pass can still depend on
/// the order of the longer output when several neighbours compete. By
/// default an exact match weighs 1, a match within `distance` steps on the
/// scale weighs 0.5 and anything else 0.
#[derive(Clone)]
pub struct DistanceComparisonModel {
    distance: usize,
    ordered: Vec<Value>,
    weight: Option<Arc<WeightFn>>,
}

impl DistanceComparisonModel {
    pub fn new<I, V>(distance: usize, ordered: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            distance,
            ordered: ordered.into_iter().map(Into::into).collect(),
            weight: None,
        }
    }

    /// Replace the default weighting.
    pub fn with_weight<F>(mut self, weight: F) -> Self
    where
        F: Fn(&Value, &Value) -> f64 + Send + Sync + 'static,
    {
        self.weight = Some(Arc::new(weight));
        self
    }

    fn position(&self, value: &Value) -> Option<usize> {
        self.ordered.iter().position(|v| v == value)
    }

    fn weigh(&self, k: &Value, l: &Value) -> f64 {
        if let Some(weight) = &self.weight {
            return weight(k, l);
        }
        if k == l {
            return 1.0;
        }
        match (self.position(k), self.position(l)) {
            (Some(i), Some(j)) if i.abs_diff(j) <= self.distance => 0.5,
            _ => 0.0,
        }
    }
}

impl core::fmt::Debug for DistanceComparisonModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistanceComparisonModel")
            .field("distance", &self.distance)
            .field("ordered", &self.ordered)
            .field("custom_weight", &self.weight.is_some())
            .finish()
    }
}

impl ComparisonModel for DistanceComparisonModel {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn is_multiple_comparison(&self) -> bool {
        false
    }

    fn run(&self, a: &[Value], b: &[Value]) -> Result<Agreement, CompareError> {
        let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };
        if longer.is_empty() {
            return Ok(Agreement::Score(1.0));
        }

        let mut used = vec![false; shorter.len()];
        let mut matched = vec![false; longer.len()];
        let mut total = 0.0;

        // exact matches first
        for (i, k) in longer.iter().enumerate() {
            if let Some(j) = (0..shorter.len()).find(|&j| !used[j] && shorter[j] == *k) {
                used[j] = true;
                matched[i] = true;
                total += self.weigh(k, &shorter[j]);
            }
        }

        for (i, k) in longer.iter().enumerate() {
            if matched[i] {
                continue;
            }
            let mut best: Option<(usize, f64)> = None;
            for (j, l) in shorter.iter().enumerate() {
                if used[j] {
                    continue;
                }
                let w = self.weigh(k, l);
                if best.is_none_or(|(_, bw)| w > bw) {
                    best = Some((j, w));
                }
            }
            if let Some((j, w)) = best {
                if w > 0.0 {
                    used[j] = true;
                    total += w;
                }
            }
        }
        Ok(Agreement::Score(total / longer.len() as f64))
    }
}
