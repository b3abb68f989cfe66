//! Contract for the remote text-generation backend.
//!
//! The core never talks to the network itself. An [`crate::Caller`] of the
//! LLM kind hands its content and system context to a [`Fetcher`] and wraps
//! whatever text comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// One message of the conversation context sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: String,
    pub content: String,
}

impl ContextEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Remote text generation.
///
/// Implementations own timeout and retry policy.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, content: &str, context: &[ContextEntry]) -> Result<String, FetchError>;
}
