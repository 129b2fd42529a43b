//! Intent pipeline: one utterance in, one validated intent out.
//!
//! Appends the utterance as a user turn, fetches the grounding window,
//! invokes the inference collaborator under a timeout, and validates the
//! raw payload against the closed operation enumeration. Inference failures
//! are recovered locally as `Unknown` intents with a detail label; they
//! never crash the session. The pipeline executes no CRM side effects.

use tokio::time::timeout;

use std::sync::Arc;
use std::time::Duration;

use crmpilot_types::error::{InferenceError, RepositoryError};
use crmpilot_types::intent::{Intent, IntentKind, RawIntent};
use crmpilot_types::session::SessionId;
use crmpilot_types::turn::{NewTurn, Turn};

use crate::history::HistoryRepository;
use crate::inference::IntentProvider;

/// Text-to-intent transform shared by all sessions.
pub struct IntentPipeline<P, H> {
    provider: Arc<P>,
    history: Arc<H>,
    window_turns: usize,
    call_timeout: Duration,
    confidence_threshold: f32,
}

impl<P, H> IntentPipeline<P, H>
where
    P: IntentProvider,
    H: HistoryRepository,
{
    pub fn new(
        provider: Arc<P>,
        history: Arc<H>,
        window_turns: usize,
        call_timeout: Duration,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            provider,
            history,
            window_turns,
            call_timeout,
            confidence_threshold,
        }
    }

    /// Parse one utterance into an intent.
    ///
    /// Returns the recorded user turn alongside the intent. Only a history
    /// store failure propagates as an error; every inference-side failure
    /// is folded into an `Unknown` intent.
    pub async fn parse(
        &self,
        session_id: &SessionId,
        utterance: &str,
    ) -> Result<(Turn, Intent), RepositoryError> {
        let user_turn = self
            .history
            .append(session_id, NewTurn::user(utterance))
            .await?;

        let window = self.history.window(session_id, self.window_turns).await?;

        let intent = match timeout(self.call_timeout, self.provider.infer(utterance, &window)).await
        {
            Ok(Ok(raw)) => self.validate(raw),
            Ok(Err(InferenceError::Malformed(reason))) => {
                tracing::warn!(session = %session_id, %reason, "inference output malformed");
                Intent::unknown("malformed-response")
            }
            Ok(Err(err)) => {
                tracing::warn!(session = %session_id, error = %err, "inference unavailable");
                Intent::unknown("inference-unavailable")
            }
            Err(_) => {
                tracing::warn!(
                    session = %session_id,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "inference call timed out"
                );
                Intent::unknown("inference-unavailable")
            }
        };

        tracing::debug!(
            session = %session_id,
            kind = %intent.kind,
            confidence = intent.confidence,
            "parsed intent"
        );

        Ok((user_turn, intent))
    }

    /// Validate a raw payload against the closed operation enumeration and
    /// the confidence threshold.
    fn validate(&self, raw: RawIntent) -> Intent {
        let Some(kind) = IntentKind::from_action(&raw.action, &raw.entity_type) else {
            return Intent {
                kind: IntentKind::Unknown,
                entities: raw.entities,
                confidence: raw.confidence,
                detail: Some("unsupported-operation".to_string()),
            };
        };

        if raw.confidence < self.confidence_threshold {
            return Intent {
                kind: IntentKind::Unknown,
                entities: raw.entities,
                confidence: raw.confidence,
                detail: Some("low-confidence".to_string()),
            };
        }

        Intent {
            kind,
            entities: raw.entities,
            confidence: raw.confidence,
            detail: None,
        }
    }
}
