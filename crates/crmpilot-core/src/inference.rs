//! IntentProvider trait definition.
//!
//! The natural-language-to-intent collaborator: an opaque function from
//! `(utterance, context window)` to a raw structured payload. The pipeline
//! owns timeout enforcement and schema validation; providers only translate.

use crmpilot_types::error::InferenceError;
use crmpilot_types::intent::RawIntent;
use crmpilot_types::turn::Turn;

/// Trait for intent inference backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in `crmpilot-infra` (`KeywordIntentProvider` for
/// offline use and tests, `OpenAiIntentProvider` for hosted inference).
pub trait IntentProvider: Send + Sync {
    /// Human-readable provider name (e.g. "keyword", "openai").
    fn name(&self) -> &str;

    /// Infer a raw intent from an utterance grounded by the most recent
    /// conversation turns (oldest first).
    fn infer(
        &self,
        utterance: &str,
        window: &[Turn],
    ) -> impl std::future::Future<Output = Result<RawIntent, InferenceError>> + Send;
}
