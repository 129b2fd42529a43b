//! Hosted intent provider speaking the OpenAI chat completions API.
//!
//! Sends the utterance plus the recent conversation window with a system
//! prompt demanding strict JSON `{action, entity_type, entities, confidence}`
//! at temperature 0, then parses the reply into a `RawIntent`. Network
//! failures map to `Unavailable`, client timeouts to `Timeout`, and replies
//! that do not parse map to `Malformed` so the pipeline can downgrade them.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use std::time::Duration;

use crmpilot_core::inference::IntentProvider;
use crmpilot_types::config::InferenceConfig;
use crmpilot_types::error::InferenceError;
use crmpilot_types::intent::RawIntent;
use crmpilot_types::turn::{Turn, TurnRole};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You translate CRM assistant messages into structured intents. \
Reply with a single JSON object and nothing else: \
{\"action\": \"create|search|update|unknown\", \
\"entity_type\": \"customer|order|product|unknown\", \
\"entities\": {...extracted fields...}, \
\"confidence\": 0.0-1.0}. \
Known entity fields: name, email, phone, company, address, customer_id, \
product_id, quantity, query. If the message is not a CRM request, use \
action \"unknown\" with confidence 0.";

/// Chat-completions-backed intent provider.
#[derive(Debug)]
pub struct OpenAiIntentProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl OpenAiIntentProvider {
    /// Build from the `[inference]` config section. Requires an API key.
    pub fn from_config(config: &InferenceConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("inference.api_key is required for openai"))?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            api_key,
        })
    }

    fn messages(&self, utterance: &str, window: &[Turn]) -> Vec<Value> {
        let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];
        // The pipeline appends the current utterance to history before
        // taking the window, so the window's last turn already carries it.
        let window = match window.last() {
            Some(last) if last.role == TurnRole::User && last.content == utterance => {
                &window[..window.len() - 1]
            }
            _ => window,
        };
        for turn in window {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
                // Infrastructure error notices carry no intent signal.
                TurnRole::SystemError => continue,
            };
            messages.push(json!({"role": role, "content": turn.content}));
        }
        messages.push(json!({"role": "user", "content": utterance}));
        messages
    }
}

/// Model replies sometimes arrive fenced in a markdown code block.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

impl IntentProvider for OpenAiIntentProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn infer(&self, utterance: &str, window: &[Turn]) -> Result<RawIntent, InferenceError> {
        let body = json!({
            "model": self.model,
            "messages": self.messages(utterance, window),
            "temperature": 0,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else {
                    InferenceError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Unavailable(format!(
                "provider returned {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::Unavailable(format!("invalid response body: {e}")))?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| InferenceError::Malformed("reply carried no content".to_string()))?;

        serde_json::from_str(strip_fences(content))
            .map_err(|e| InferenceError::Malformed(format!("reply is not an intent object: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_rejected() {
        let err = OpenAiIntentProvider::from_config(&InferenceConfig::default()).unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn base_url_defaults_and_strips_trailing_slash() {
        let provider = OpenAiIntentProvider::from_config(&InferenceConfig {
            api_key: Some(SecretString::from("sk-test")),
            base_url: Some("https://proxy.example.com/v1/".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.base_url, "https://proxy.example.com/v1");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let content = "```json\n{\"action\":\"search\",\"entity_type\":\"customer\"}\n```";
        let raw: RawIntent = serde_json::from_str(strip_fences(content)).unwrap();
        assert_eq!(raw.action, "search");
    }

    #[test]
    fn window_skips_error_turns() {
        let provider = OpenAiIntentProvider::from_config(&InferenceConfig {
            api_key: Some(SecretString::from("sk-test")),
            ..Default::default()
        })
        .unwrap();

        let window = vec![
            turn(TurnRole::User, "find li si"),
            turn(TurnRole::SystemError, "history unavailable"),
            turn(TurnRole::Assistant, "Found 1 customer."),
        ];
        let messages = provider.messages("create an order", &window);
        // system prompt + two surviving turns + the utterance
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn current_utterance_appears_exactly_once() {
        let provider = OpenAiIntentProvider::from_config(&InferenceConfig {
            api_key: Some(SecretString::from("sk-test")),
            ..Default::default()
        })
        .unwrap();

        // The window already ends with the utterance being inferred.
        let window = vec![
            turn(TurnRole::User, "find li si"),
            turn(TurnRole::Assistant, "Found 1 customer."),
            turn(TurnRole::User, "create an order"),
        ];
        let messages = provider.messages("create an order", &window);
        assert_eq!(messages.len(), 4);
        let repeats = messages
            .iter()
            .filter(|m| m["content"] == "create an order")
            .count();
        assert_eq!(repeats, 1);
        assert_eq!(messages.last().unwrap()["role"], "user");
    }

    fn turn(role: TurnRole, content: &str) -> Turn {
        Turn {
            id: uuid::Uuid::now_v7(),
            session_id: crmpilot_types::session::SessionId::from("s1"),
            seq: 0,
            role,
            content: content.to_string(),
            created_at: chrono::Utc::now(),
            error_code: None,
            payload: None,
        }
    }
}
