//! Pairing responses that share a root input and dispatching to a model.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use cs_core::Response;

use crate::error::CompareError;
use crate::model::{Agreement, ComparisonModel, as_items};

/// Two responses grown from the same root input.
#[derive(Debug, Clone)]
pub struct Comparator {
    a: Arc<Response>,
    b: Arc<Response>,
}

impl Comparator {
    pub fn new(a: &Arc<Response>, b: &Arc<Response>) -> Result<Self, CompareError> {
        if a.root_input() != b.root_input() {
            return Err(CompareError::MismatchedInput {
                left: a.root_input().to_string(),
                right: b.root_input().to_string(),
            });
        }
        Ok(Self {
            a: Arc::clone(a),
            b: Arc::clone(b),
        })
    }

    pub fn a(&self) -> &Arc<Response> {
        &self.a
    }

    pub fn b(&self) -> &Arc<Response> {
        &self.b
    }

    pub fn root_input(&self) -> &Value {
        self.a.root_input()
    }

    /// Compare the two outputs with a pairwise model.
    pub fn run(&self, model: &dyn ComparisonModel) -> Result<Agreement, CompareError> {
        if model.is_multiple_comparison() {
            return Err(CompareError::WrongModelKind {
                model: model.name(),
                expected: "pairwise",
            });
        }
        model.run(&as_items(self.a.output()), &as_items(self.b.output()))
    }

    /// Pair up responses from two lists by root input.
    ///
    /// Keys present in only one list are dropped. If a list holds several
    /// responses for one root input, the last one is used.
    pub fn match_pairs(list_a: &[Arc<Response>], list_b: &[Arc<Response>]) -> Vec<Comparator> {
        let index_a = index_by_root(list_a);
        let index_b = index_by_root(list_b);
        let pairs: Vec<Comparator> = index_a
            .iter()
            .filter_map(|(key, a)| {
                index_b.get(key).map(|b| Comparator {
                    a: Arc::clone(a),
                    b: Arc::clone(b),
                })
            })
            .collect();
        tracing::debug!(
            left = index_a.len(),
            right = index_b.len(),
            matched = pairs.len(),
            "comparator.match"
        );
        pairs
    }

    /// Compare two lists of responses with a multi-item model.
    ///
    /// The model sees the outputs of the matched pairs, aligned by root input.
    pub fn compare_multiple(
        list_a: &[Arc<Response>],
        list_b: &[Arc<Response>],
        model: &dyn ComparisonModel,
    ) -> Result<Agreement, CompareError> {
        if !model.is_multiple_comparison() {
            return Err(CompareError::WrongModelKind {
                model: model.name(),
                expected: "multi-item",
            });
        }
        let pairs = Self::match_pairs(list_a, list_b);
        if pairs.is_empty() {
            return Err(CompareError::NoMatch);
        }
        let (outputs_a, outputs_b): (Vec<Value>, Vec<Value>) = pairs
            .iter()
            .map(|pair| (pair.a.output().clone(), pair.b.output().clone()))
            .unzip();
        model.run(&outputs_a, &outputs_b)
    }
}

/// Root input as an index key; JSON text is equal exactly when values are.
fn index_by_root(list: &[Arc<Response>]) -> IndexMap<String, &Arc<Response>> {
    let mut index = IndexMap::with_capacity(list.len());
    for response in list {
        index.insert(response.root_input().to_string(), response);
    }
    index
}

/// `response.compare(&other)` for shared responses.
pub trait Compare {
    fn compare(&self, other: &Arc<Response>) -> Result<Comparator, CompareError>;
}

impl Compare for Arc<Response> {
    fn compare(&self, other: &Arc<Response>) -> Result<Comparator, CompareError> {
        Comparator::new(self, other)
    }
}
