//! LLM integration.
//!
//! A single OpenAI-compatible HTTP backend; OpenRouter is the default
//! endpoint. The `LlmProvider` trait is the seam the composer depends on,
//! so tests swap in mocks without touching the network.

pub mod openai;
pub mod provider;

pub use openai::{OPENROUTER_BASE_URL, OpenAiCompatibleProvider};
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("TRIAGE_LLM_API_KEY")
            .or_else(|| get("OPENROUTER_API_KEY"))
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "TRIAGE_LLM_API_KEY".to_string(),
                hint: "Set TRIAGE_LLM_API_KEY (or OPENROUTER_API_KEY) to your provider key"
                    .to_string(),
            })?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: get("TRIAGE_LLM_BASE_URL").unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
            model: get("TRIAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using {} (model: {})", config.base_url, config.model);
    Arc::new(OpenAiCompatibleProvider::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_openrouter() {
        let config = LlmConfig::from_lookup(lookup(&[("TRIAGE_LLM_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.base_url, OPENROUTER_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn falls_back_to_openrouter_key() {
        let config = LlmConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-or"),
            ("TRIAGE_MODEL", "openai/gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(config.model, "openai/gpt-4o");
    }

    #[test]
    fn missing_key_is_reported() {
        let err = LlmConfig::from_lookup(lookup(&[("TRIAGE_LLM_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn create_provider_uses_configured_model() {
        let config = LlmConfig {
            api_key: SecretString::from("sk-test"),
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3".to_string(),
        };
        assert_eq!(create_provider(&config).model_name(), "llama3");
    }
}
