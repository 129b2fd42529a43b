//! Response emitter: durability first, delivery second.
//!
//! Every request cycle ends here with exactly one appended assistant (or
//! system-error) turn. Only after the turn is durably recorded does the
//! emitter look up the session's live channel and attempt a single push;
//! an absent, closed, or failing channel degrades to history-only delivery
//! with no re-queue. Clients reconcile missed turns via the history pull.

use std::sync::Arc;

use crmpilot_types::crm::OperationResult;
use crmpilot_types::error::RepositoryError;
use crmpilot_types::intent::Intent;
use crmpilot_types::protocol::{OutboundEnvelope, OutboundFrame};
use crmpilot_types::session::SessionId;
use crmpilot_types::turn::{NewTurn, Turn};

use crate::history::HistoryRepository;
use crate::registry::SessionRegistry;

/// Terminal outcome of one request cycle.
#[derive(Debug)]
pub enum Outcome {
    /// A CRM operation completed (successfully or not).
    Operation(OperationResult),
    /// The utterance could not be turned into an operation; ask the user
    /// to clarify. Carries the downgraded intent for its detail label and
    /// any guessed entities.
    Clarification(Intent),
}

/// Formats outcomes and publishes them toward the originating session.
pub struct ResponseEmitter<H> {
    history: Arc<H>,
    registry: Arc<SessionRegistry>,
}

impl<H: HistoryRepository> ResponseEmitter<H> {
    pub fn new(history: Arc<H>, registry: Arc<SessionRegistry>) -> Self {
        Self { history, registry }
    }

    /// Record the outcome as one turn, then attempt live delivery.
    ///
    /// Returns the recorded turn. Only the history append can fail; a
    /// delivery failure is logged and absorbed.
    pub async fn emit(
        &self,
        session_id: &SessionId,
        outcome: Outcome,
    ) -> Result<Turn, RepositoryError> {
        let new_turn = match &outcome {
            Outcome::Operation(result) => {
                let payload = result
                    .data
                    .as_ref()
                    .map(|data| serde_json::Value::Object(data.clone()));
                if result.success {
                    NewTurn::assistant(result.message.clone(), payload)
                } else {
                    NewTurn {
                        error_code: result.error_code.clone(),
                        ..NewTurn::assistant(result.message.clone(), payload)
                    }
                }
            }
            Outcome::Clarification(intent) => NewTurn {
                error_code: Some(
                    intent
                        .detail
                        .clone()
                        .unwrap_or_else(|| "unknown-intent".to_string()),
                ),
                ..NewTurn::assistant(clarification_text(intent), None)
            },
        };

        let turn = self.history.append(session_id, new_turn).await?;
        self.deliver(session_id, &turn).await;
        Ok(turn)
    }

    /// Record an infrastructure failure as a system-error turn (best
    /// effort) and push an error frame if a channel is live.
    pub async fn emit_system_error(&self, session_id: &SessionId, label: &str, text: &str) {
        match self
            .history
            .append(session_id, NewTurn::system_error(text, label))
            .await
        {
            Ok(_) => {}
            Err(err) => {
                tracing::error!(session = %session_id, error = %err, "failed to record system error turn");
            }
        }

        if let Some(channel) = self.registry.resolve(session_id) {
            let envelope = OutboundEnvelope::now(
                session_id.clone(),
                OutboundFrame::Error {
                    content: text.to_string(),
                    error: label.to_string(),
                },
            );
            if let Err(err) = channel.send(envelope).await {
                tracing::debug!(session = %session_id, error = %err, "error frame not delivered");
            }
        }
    }

    async fn deliver(&self, session_id: &SessionId, turn: &Turn) {
        let Some(channel) = self.registry.resolve(session_id) else {
            tracing::debug!(session = %session_id, seq = turn.seq, "no live channel, turn delivered to history only");
            return;
        };

        let envelope = OutboundEnvelope::now(
            session_id.clone(),
            OutboundFrame::AiResponse {
                content: turn.content.clone(),
            },
        );
        if let Err(err) = channel.send(envelope).await {
            tracing::debug!(
                session = %session_id,
                seq = turn.seq,
                error = %err,
                "live delivery failed, turn remains in history"
            );
        }
    }
}

/// User-facing text for a clarification request, keyed on why the
/// utterance ended up unrecognized.
fn clarification_text(intent: &Intent) -> String {
    match intent.detail.as_deref() {
        Some("low-confidence") => "I think that was a CRM request, but I'm not confident enough \
             to act on it. Please rephrase with a bit more detail."
            .to_string(),
        Some("inference-unavailable") => {
            "I couldn't reach the language service just now. Please try again in a moment."
                .to_string()
        }
        _ => "I didn't recognize a CRM operation in that. You can ask me to create, \
              search, or update customers, create orders, or look up products."
            .to_string(),
    }
}
