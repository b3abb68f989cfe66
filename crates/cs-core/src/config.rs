//! Backend configuration and request payloads.
//!
//! Configuration arrives as JSON (whatever loader produced it upstream).
//! The library does no network I/O itself: a concrete [`Fetcher`] built by
//! the embedding application reads the config and posts [`ChatRequest`]s.
//! [`Caller::configured_llm`] validates the config before such a fetcher is
//! wrapped, so an invalid config never reaches a fetch.
//!
//! [`Fetcher`]: crate::fetch::Fetcher
//! [`Caller::configured_llm`]: crate::caller::Caller::configured_llm

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::ContextEntry;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Sampling settings forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "GenerationSettings::default_temperature")]
    pub temperature: f64,
    #[serde(default = "GenerationSettings::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
}

impl GenerationSettings {
    fn default_temperature() -> f64 {
        0.7
    }

    fn default_max_tokens() -> u32 {
        512
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
            stream: false,
        }
    }
}

/// Where and how to reach the text-generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    pub model: String,
    /// Base address, e.g. `http://localhost`
    pub path: String,
    pub port: u16,
    /// Route on the backend, e.g. `/v1/chat/completions`
    pub endpoint: String,
    #[serde(default)]
    pub settings: GenerationSettings,
}

impl FetchConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        if self.path.trim().is_empty() {
            return Err(invalid("path", "must not be empty"));
        }
        if !self.endpoint.starts_with('/') {
            return Err(invalid("endpoint", "must start with '/'"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must be non-zero"));
        }
        let t = self.settings.temperature;
        if !(0.0..=2.0).contains(&t) {
            return Err(invalid("settings.temperature", format!("{t} outside [0, 2]")));
        }
        if self.settings.max_tokens == 0 {
            return Err(invalid("settings.max_tokens", "must be positive"));
        }
        Ok(())
    }

    /// Full URL of the generation endpoint.
    pub fn url(&self) -> String {
        format!(
            "{}:{}{}",
            self.path.trim_end_matches('/'),
            self.port,
            self.endpoint
        )
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Request body a concrete fetcher posts to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ContextEntry>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// System context first, then the content as the user turn.
    pub fn new(config: &FetchConfig, content: &str, context: &[ContextEntry]) -> Self {
        let mut messages = context.to_vec();
        messages.push(ContextEntry::user(content));
        Self {
            model: config.model.clone(),
            messages,
            temperature: config.settings.temperature,
            max_tokens: config.settings.max_tokens,
            stream: config.settings.stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "model": "llama3",
        "path": "http://localhost",
        "port": 11434,
        "endpoint": "/api/chat",
        "settings": { "temperature": 0.2, "max_tokens": 64, "stream": false }
    }"#;

    #[test]
    fn test_parse_and_url() {
        let config = FetchConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.model, "llama3");
        assert_eq!(config.url(), "http://localhost:11434/api/chat");
        assert_eq!(config.settings.max_tokens, 64);
    }

    #[test]
    fn test_settings_default_when_missing() {
        let config = FetchConfig::from_json_str(
            r#"{"model":"m","path":"http://h","port":80,"endpoint":"/e"}"#,
        )
        .unwrap();
        assert_eq!(config.settings, GenerationSettings::default());
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let mut config = FetchConfig::from_json_str(SAMPLE).unwrap();
        config.settings.temperature = 3.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "settings.temperature",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_missing_field() {
        let result = FetchConfig::from_json_str(r#"{"model":"m","port":80}"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_relative_endpoint() {
        let result = FetchConfig::from_json_str(
            r#"{"model":"m","path":"http://h","port":80,"endpoint":"chat"}"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "endpoint", .. })
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = FetchConfig::from_path(&path).unwrap();
        assert_eq!(config.port, 11434);
    }

    #[test]
    fn test_chat_request_appends_user_turn() {
        let config = FetchConfig::from_json_str(SAMPLE).unwrap();
        let req = ChatRequest::new(&config, "hello", &[ContextEntry::system("sys")]);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1], ContextEntry::user("hello"));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["messages"][0]["role"], "system");
    }
}
