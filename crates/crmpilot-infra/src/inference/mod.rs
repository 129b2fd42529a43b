//! Intent provider implementations.
//!
//! [`AnyIntentProvider`] mirrors the CRM adapter pattern: a delegating enum
//! so provider selection is a config decision while the orchestrator stays
//! monomorphic.

pub mod keyword;
pub mod openai;

pub use keyword::KeywordIntentProvider;
pub use openai::OpenAiIntentProvider;

use crmpilot_core::inference::IntentProvider;
use crmpilot_types::config::InferenceConfig;
use crmpilot_types::error::InferenceError;
use crmpilot_types::intent::RawIntent;
use crmpilot_types::turn::Turn;

/// Runtime-selected inference backend.
pub enum AnyIntentProvider {
    Keyword(KeywordIntentProvider),
    OpenAi(OpenAiIntentProvider),
}

impl AnyIntentProvider {
    /// Build the provider named by `config.inference.provider`.
    pub fn from_config(config: &InferenceConfig) -> anyhow::Result<Self> {
        match config.provider.as_str() {
            "keyword" => Ok(AnyIntentProvider::Keyword(KeywordIntentProvider::new())),
            "openai" => Ok(AnyIntentProvider::OpenAi(OpenAiIntentProvider::from_config(
                config,
            )?)),
            other => anyhow::bail!(
                "unknown inference provider '{other}' (expected \"keyword\" or \"openai\")"
            ),
        }
    }
}

impl IntentProvider for AnyIntentProvider {
    fn name(&self) -> &str {
        match self {
            AnyIntentProvider::Keyword(p) => p.name(),
            AnyIntentProvider::OpenAi(p) => p.name(),
        }
    }

    async fn infer(&self, utterance: &str, window: &[Turn]) -> Result<RawIntent, InferenceError> {
        match self {
            AnyIntentProvider::Keyword(p) => p.infer(utterance, window).await,
            AnyIntentProvider::OpenAi(p) => p.infer(utterance, window).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let config = InferenceConfig {
            provider: "oracle".to_string(),
            ..Default::default()
        };
        assert!(AnyIntentProvider::from_config(&config).is_err());
    }

    #[test]
    fn keyword_provider_builds_without_credentials() {
        let provider = AnyIntentProvider::from_config(&InferenceConfig::default()).unwrap();
        assert_eq!(provider.name(), "keyword");
    }
}
