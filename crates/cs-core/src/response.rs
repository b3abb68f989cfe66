//! Response lineage.
//!
//! A [`Response`] records one hop of a transformation chain: the output, the
//! caller that produced it, and what it was produced from. The input is
//! either a seed value or the previous response, so every chain is a
//! singly-linked list ending in a seed (the root input).

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::caller::Caller;
use crate::error::LineageError;

/// How a response came into being.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Generator {
    /// Produced by a function or a text-generation backend
    Programmatic,
    /// Passed through an identity caller
    Input,
    /// Imported from external data
    Custom,
}

/// Reference from a response to the caller that produced it.
///
/// Responses read back from a snapshot may name a caller that has not been
/// registered in this session. Such references stay `Unresolved` until a
/// matching caller is registered.
#[derive(Debug, Clone)]
pub enum CallerRef {
    Resolved(Arc<Caller>),
    Unresolved(String),
}

impl CallerRef {
    pub fn id(&self) -> &str {
        match self {
            CallerRef::Resolved(caller) => caller.id(),
            CallerRef::Unresolved(id) => id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, CallerRef::Resolved(_))
    }
}

impl From<Arc<Caller>> for CallerRef {
    fn from(caller: Arc<Caller>) -> Self {
        CallerRef::Resolved(caller)
    }
}

/// What a response was produced from.
#[derive(Debug, Clone)]
pub enum Input {
    Seed(Value),
    Step(Arc<Response>),
}

impl Input {
    /// The value a caller operates on: the seed itself or the previous output.
    pub fn value(&self) -> &Value {
        match self {
            Input::Seed(value) => value,
            Input::Step(response) => response.output(),
        }
    }

    pub fn root_input(&self) -> &Value {
        match self {
            Input::Seed(value) => value,
            Input::Step(response) => response.root_input(),
        }
    }

    /// Depth of the response that consumes this input.
    fn next_level(&self) -> usize {
        match self {
            Input::Seed(_) => 1,
            Input::Step(response) => response.level() + 1,
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Seed(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Seed(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Seed(Value::String(value))
    }
}

impl From<Arc<Response>> for Input {
    fn from(response: Arc<Response>) -> Self {
        Input::Step(response)
    }
}

impl From<&Arc<Response>> for Input {
    fn from(response: &Arc<Response>) -> Self {
        Input::Step(Arc::clone(response))
    }
}

/// One node of a lineage chain.
#[derive(Debug)]
pub struct Response {
    output: Value,
    caller: RwLock<CallerRef>,
    input: Input,
    generator: Generator,
    level: usize,
}

impl Response {
    /// Record an output produced by `caller` from `input`.
    pub fn new(
        output: impl Into<Value>,
        caller: &Arc<Caller>,
        input: impl Into<Input>,
        generator: Generator,
    ) -> Arc<Self> {
        Self::from_parts(
            output.into(),
            CallerRef::Resolved(Arc::clone(caller)),
            input.into(),
            generator,
        )
    }

    /// Import externally produced data as a response of `caller`.
    pub fn import(
        output: impl Into<Value>,
        caller: &Arc<Caller>,
        input: impl Into<Input>,
    ) -> Arc<Self> {
        Self::new(output, caller, input, Generator::Custom)
    }

    /// Build a response from a possibly unresolved caller reference.
    pub fn from_parts(
        output: Value,
        caller: CallerRef,
        input: Input,
        generator: Generator,
    ) -> Arc<Self> {
        let level = input.next_level();
        Arc::new(Self {
            output,
            caller: RwLock::new(caller),
            input,
            generator,
            level,
        })
    }

    pub fn output(&self) -> &Value {
        &self.output
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn generator(&self) -> Generator {
        self.generator
    }

    /// Chain depth; 1 for a response made directly from a seed.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_root(&self) -> bool {
        matches!(self.input, Input::Seed(_))
    }

    /// The previous response, if this one was not made from a seed.
    pub fn parent(&self) -> Option<&Arc<Response>> {
        match &self.input {
            Input::Seed(_) => None,
            Input::Step(response) => Some(response),
        }
    }

    pub fn caller_ref(&self) -> CallerRef {
        self.caller.read().clone()
    }

    pub fn caller_id(&self) -> String {
        self.caller.read().id().to_string()
    }

    /// The producing caller, when it is resolved in this session.
    pub fn caller(&self) -> Option<Arc<Caller>> {
        match &*self.caller.read() {
            CallerRef::Resolved(caller) => Some(Arc::clone(caller)),
            CallerRef::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.caller.read().is_resolved()
    }

    /// Bind a freshly registered caller to an unresolved reference.
    ///
    /// Only an unresolved reference with the same id is rebound. Returns
    /// whether a rebinding happened.
    pub fn link_caller(&self, caller: &Arc<Caller>) -> bool {
        let mut slot = self.caller.write();
        match &*slot {
            CallerRef::Unresolved(id) if id == caller.id() => {
                *slot = CallerRef::Resolved(Arc::clone(caller));
                true
            }
            _ => false,
        }
    }

    /// The seed value at the start of the chain.
    pub fn root_input(&self) -> &Value {
        let mut current = self;
        loop {
            match &current.input {
                Input::Seed(value) => return value,
                Input::Step(parent) => current = &**parent,
            }
        }
    }

    /// The response `hops` steps back; `get(0)` is `self`.
    pub fn get(&self, hops: usize) -> Result<&Response, LineageError> {
        let mut current = self;
        for step in 0..hops {
            let parent = current.parent().ok_or_else(|| {
                LineageError::Validation(format!(
                    "cannot go back {hops} hops: chain ends after {step}"
                ))
            })?;
            current = &**parent;
        }
        Ok(current)
    }

    /// Walk from this response to the one made from the seed.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    /// Per-hop renderings, most recent first.
    pub fn expanded(&self) -> Expanded<'_> {
        Expanded { chain: self.chain() }
    }

    /// Plain JSON structure with callers replaced by their ids.
    pub fn to_json(&self) -> Value {
        let input = match &self.input {
            Input::Seed(value) => value.clone(),
            Input::Step(parent) => parent.to_json(),
        };
        json!({
            "output": self.output,
            "caller": self.caller_id(),
            "input": input,
            "root": self.is_root(),
            "level": self.level,
            "generator": self.generator,
        })
    }

    /// Run this response's caller again on new content.
    pub async fn rerun(&self, content: impl Into<Input>) -> Result<Arc<Response>, LineageError> {
        let caller = self
            .caller()
            .ok_or_else(|| LineageError::UnresolvedCaller(self.caller_id()))?;
        caller.run(content).await
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]: '{}' ({})",
            self.caller.read().id(),
            display_value(&self.output),
            self.level
        )
    }
}

/// Strings render bare, everything else as JSON text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Iterator over a lineage chain, most recent first.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    next: Option<&'a Response>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Response;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent().map(|p| p.as_ref());
        Some(current)
    }
}

/// Iterator of `"[caller]: 'output' (level)"` lines, most recent first.
#[derive(Debug, Clone)]
pub struct Expanded<'a> {
    chain: Chain<'a>,
}

impl Iterator for Expanded<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.chain.next().map(|r| r.to_string())
    }
}
