//! Caller registry and pending caller lookups.
//!
//! The registry owns every registered caller by id. Responses restored from
//! a snapshot whose caller is not registered yet are parked here, keyed by
//! caller id, and bound to the caller as soon as it registers.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::caller::Caller;
use crate::error::LineageError;
use crate::response::Response;

/// Id-to-caller mapping with deferred linking.
#[derive(Debug, Default)]
pub struct CallerRegistry {
    callers: HashMap<String, Arc<Caller>>,
    pending: HashMap<String, Vec<Weak<Response>>>,
}

impl CallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller under its id.
    ///
    /// Any responses waiting on this id are rebound to the returned caller.
    pub fn register(&mut self, caller: impl Into<Arc<Caller>>) -> Result<Arc<Caller>, LineageError> {
        let caller = caller.into();
        let id = caller.id().to_string();
        if self.callers.contains_key(&id) {
            return Err(LineageError::DuplicateId(id));
        }
        self.callers.insert(id.clone(), Arc::clone(&caller));
        let linked = self.link_pending(&caller);
        tracing::debug!(caller = %id, kind = caller.kind().name(), linked, "registry.register");
        Ok(caller)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.callers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Caller>> {
        self.callers.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.callers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Park a response until a caller with `id` registers.
    ///
    /// Handles to responses already dropped are cleared from `id`'s list.
    pub fn defer(&mut self, id: &str, response: &Arc<Response>) {
        tracing::trace!(caller = %id, level = response.level(), "registry.defer");
        let waiting = self.pending.entry(id.to_string()).or_default();
        waiting.retain(|w| w.strong_count() > 0);
        waiting.push(Arc::downgrade(response));
    }

    /// Drop handles to responses that no longer exist, and ids left with
    /// none. Returns the number of handles removed.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        self.pending.retain(|_, waiting| {
            let before = waiting.len();
            waiting.retain(|w| w.strong_count() > 0);
            removed += before - waiting.len();
            !waiting.is_empty()
        });
        if removed > 0 {
            tracing::trace!(removed, "registry.prune");
        }
        removed
    }

    /// Number of live responses still waiting on `id`.
    pub fn pending(&self, id: &str) -> usize {
        self.pending
            .get(id)
            .map(|waiting| waiting.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Ids that still have live responses waiting on them, sorted.
    pub fn pending_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .pending
            .iter()
            .filter(|(_, waiting)| waiting.iter().any(|w| w.strong_count() > 0))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    fn link_pending(&mut self, caller: &Arc<Caller>) -> usize {
        let Some(waiting) = self.pending.remove(caller.id()) else {
            return 0;
        };
        waiting
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|response| response.link_caller(caller))
            .count()
    }
}
