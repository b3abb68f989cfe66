//! Agreement reporting: runs a set of models over two response lists and
//! aggregates the results into human-readable and machine-readable reports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cs_core::Response;

use crate::comparator::Comparator;
use crate::error::CompareError;
use crate::model::{Agreement, ComparisonModel};

/// Summary of comparing two raters over a shared set of root inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementReport {
    /// Descriptive label for this report (e.g. "sentiment: llama3 vs gpt").
    pub label: String,
    /// Responses supplied by the first rater.
    pub left_count: usize,
    /// Responses supplied by the second rater.
    pub right_count: usize,
    /// Root inputs both raters answered.
    pub matched: usize,
    /// Per-model results, in evaluation order.
    pub scores: Vec<ModelScore>,
}

/// Result of one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: String,
    pub agreement: Agreement,
}

impl AgreementReport {
    /// Create a new empty report.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            left_count: 0,
            right_count: 0,
            matched: 0,
            scores: Vec::new(),
        }
    }

    /// Run every model over the matched pairs of `list_a` and `list_b`.
    ///
    /// Pairwise models are averaged over the matched pairs; multi-item models
    /// see all matched pairs at once.
    pub fn evaluate(
        label: impl Into<String>,
        list_a: &[Arc<Response>],
        list_b: &[Arc<Response>],
        models: &[&dyn ComparisonModel],
    ) -> Result<Self, CompareError> {
        let mut report = Self::new(label);
        report.left_count = list_a.len();
        report.right_count = list_b.len();

        let pairs = Comparator::match_pairs(list_a, list_b);
        report.matched = pairs.len();
        if pairs.is_empty() {
            return Err(CompareError::NoMatch);
        }

        for model in models {
            let agreement = if model.is_multiple_comparison() {
                Comparator::compare_multiple(list_a, list_b, *model)?
            } else {
                mean_pairwise(&pairs, *model)?
            };
            report.add_score(model.name(), agreement);
        }
        Ok(report)
    }

    /// Record one model's result.
    pub fn add_score(&mut self, model: impl Into<String>, agreement: Agreement) {
        self.scores.push(ModelScore {
            model: model.into(),
            agreement,
        });
    }

    /// Responses that found no partner on the other side.
    pub fn dropped(&self) -> usize {
        (self.left_count + self.right_count).saturating_sub(2 * self.matched)
    }

    /// Look up a model's result by name.
    pub fn score(&self, model: &str) -> Option<Agreement> {
        self.scores
            .iter()
            .find(|s| s.model == model)
            .map(|s| s.agreement)
    }

    /// True if every model produced a score of at least `threshold`.
    pub fn passed(&self, threshold: f64) -> bool {
        self.scores
            .iter()
            .all(|s| s.agreement.score().is_some_and(|v| v >= threshold))
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n============================================================");
        println!("Agreement Report: {}", self.label);
        println!(
            "Responses: {} vs {}, matched: {}, dropped: {}",
            self.left_count,
            self.right_count,
            self.matched,
            self.dropped()
        );
        for s in &self.scores {
            println!("  {:<22} {}", s.model, s.agreement);
        }
        println!("============================================================\n");
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

fn mean_pairwise(pairs: &[Comparator], model: &dyn ComparisonModel) -> Result<Agreement, CompareError> {
    let mut total = 0.0;
    let mut counted = 0usize;
    for pair in pairs {
        if let Some(score) = pair.run(model)?.score() {
            total += score;
            counted += 1;
        }
    }
    if counted == 0 {
        return Ok(Agreement::Undefined);
    }
    Ok(Agreement::Score(total / counted as f64))
}
