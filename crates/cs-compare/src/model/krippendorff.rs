use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::{Agreement, ComparisonModel, as_items, ensure_aligned};
use crate::error::CompareError;

/// Weight of two labels agreeing, 1 for identical labels by default.
pub type LabelWeightFn = dyn Fn(&str, &str) -> f64 + Send + Sync;

/// Tolerance for treating expected or observed agreement as total.
const EPSILON: f64 = 1e-12;

/// Krippendorff's alpha over single- or multi-label items.
///
/// Labels are compared by their string form; values outside `labels` are
/// ignored, and items where fewer than two raters kept a label are dropped.
/// When any rater gives more than one label on any item, observed agreement
/// per item is the Jaccard index of the two label sets and expected agreement
/// is the sum of squared pooled label frequencies; the weight function does
/// not apply there. This multi-label expected agreement is an approximation,
/// not the textbook coefficient, and is kept as is.
///
/// The result is floored to three decimals.
#[derive(Clone)]
pub struct KrippendorffsComparisonModel {
    labels: Vec<String>,
    weight: Option<Arc<LabelWeightFn>>,
}

/// One rater's valid labels for one item, deduplicated in first-seen order.
type LabelSet = Vec<String>;

impl KrippendorffsComparisonModel {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            weight: None,
        }
    }

    /// Replace identity weighting on the single-label path.
    pub fn with_weight<F>(mut self, weight: F) -> Self
    where
        F: Fn(&str, &str) -> f64 + Send + Sync + 'static,
    {
        self.weight = Some(Arc::new(weight));
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn weigh(&self, c: &str, k: &str) -> f64 {
        match &self.weight {
            Some(weight) => weight(c, k),
            None if c == k => 1.0,
            None => 0.0,
        }
    }

    fn valid_labels(&self, output: &Value) -> LabelSet {
        let mut set = LabelSet::new();
        for item in as_items(output) {
            let label = label_string(&item);
            if self.labels.contains(&label) && !set.contains(&label) {
                set.push(label);
            }
        }
        set
    }

    fn multi_label(&self, items: &[[LabelSet; 2]]) -> (f64, f64) {
        let observed: f64 = items.iter().map(|[a, b]| jaccard(a, b)).sum::<f64>() / items.len() as f64;

        let mut pooled: BTreeMap<&str, usize> = BTreeMap::new();
        for label in items.iter().flatten().flatten() {
            *pooled.entry(label.as_str()).or_default() += 1;
        }
        let total: usize = pooled.values().sum();
        let expected: f64 = pooled
            .values()
            .map(|&count| {
                let p = count as f64 / total as f64;
                p * p
            })
            .sum();
        (observed, expected)
    }

    fn single_label(&self, items: &[[LabelSet; 2]]) -> (f64, f64) {
        let mut pooled: BTreeMap<&str, usize> = BTreeMap::new();
        let mut observed = 0.0;
        for item in items {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for label in item.iter().flatten() {
                *counts.entry(label.as_str()).or_default() += 1;
                *pooled.entry(label.as_str()).or_default() += 1;
            }
            let n: usize = counts.values().sum();
            let mut agreeing = 0.0;
            for (&c, &n_c) in &counts {
                for (&k, &n_k) in &counts {
                    let pairs = if c == k { n_c * (n_k - 1) } else { n_c * n_k };
                    agreeing += self.weigh(c, k) * pairs as f64;
                }
            }
            observed += agreeing / (n * (n - 1)) as f64;
        }
        observed /= items.len() as f64;

        let total: usize = pooled.values().sum();
        let mut expected = 0.0;
        for (&c, &n_c) in &pooled {
            for (&k, &n_k) in &pooled {
                let pi_c = n_c as f64 / total as f64;
                let pi_k = n_k as f64 / total as f64;
                expected += self.weigh(c, k) * pi_c * pi_k;
            }
        }
        (observed, expected)
    }
}

impl core::fmt::Debug for KrippendorffsComparisonModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KrippendorffsComparisonModel")
            .field("labels", &self.labels)
            .field("custom_weight", &self.weight.is_some())
            .finish()
    }
}

impl ComparisonModel for KrippendorffsComparisonModel {
    fn name(&self) -> &'static str {
        "krippendorffs_alpha"
    }

    fn is_multiple_comparison(&self) -> bool {
        true
    }

    fn run(&self, a: &[Value], b: &[Value]) -> Result<Agreement, CompareError> {
        ensure_aligned(self.name(), a, b)?;

        let items: Vec<[LabelSet; 2]> = a
            .iter()
            .zip(b)
            .map(|(x, y)| [self.valid_labels(x), self.valid_labels(y)])
            .filter(|raters| raters.iter().filter(|set| !set.is_empty()).count() >= 2)
            .collect();
        if items.is_empty() {
            tracing::debug!(model = self.name(), "no item rated by both raters");
            return Ok(Agreement::Undefined);
        }

        let multi = items.iter().flatten().any(|set| set.len() > 1);
        let (observed, expected) = if multi {
            self.multi_label(&items)
        } else {
            self.single_label(&items)
        };
        tracing::trace!(model = self.name(), multi, observed, expected, items = items.len(), "krippendorff.run");

        if 1.0 - expected <= EPSILON {
            return Ok(if (observed - 1.0).abs() <= EPSILON {
                Agreement::Score(1.0)
            } else {
                Agreement::Undefined
            });
        }
        let alpha = (observed - expected) / (1.0 - expected);
        Ok(Agreement::Score((alpha * 1000.0).floor() / 1000.0))
    }
}

/// String form of a label value; strings are used bare.
fn label_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn jaccard(a: &LabelSet, b: &LabelSet) -> f64 {
    let shared = a.iter().filter(|l| b.contains(l)).count();
    let union = a.len() + b.len() - shared;
    if union == 0 {
        return 1.0;
    }
    shared as f64 / union as f64
}
