//! Application configuration.
//!
//! Deserialized from `config.toml` by the infra loader. Every field has a
//! default so a missing or partial file still yields a runnable service
//! (mock adapter, keyword intent provider).

use secrecy::SecretString;
use serde::Deserialize;

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub inference: InferenceConfig,
    pub crm: CrmConfig,
    pub storage: StorageConfig,
}

/// Turn persistence settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database URL for conversation history.
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://crmpilot.db?mode=rwc".to_string(),
        }
    }
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Conversation grounding window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of most recent turns fed to the intent provider.
    pub window_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { window_turns: 20 }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is swept.
    pub inactivity_secs: u64,
    /// Interval between registry sweep passes.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

/// Operation dispatch retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Additional attempts after the first for transient adapter failures.
    pub retry_limit: u32,
    /// Base backoff delay, doubled per retry.
    pub backoff_base_ms: u64,
    /// Upper bound on a single adapter call.
    pub adapter_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            backoff_base_ms: 250,
            adapter_timeout_ms: 15_000,
        }
    }
}

/// Intent inference collaborator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Provider selector: "keyword" (offline) or "openai".
    pub provider: String,
    pub model: String,
    /// API key for hosted providers. Never logged.
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    /// Upper bound on one inference call.
    pub timeout_ms: u64,
    /// Confidence below this becomes a clarification request.
    pub confidence_threshold: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: "keyword".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            timeout_ms: 30_000,
            confidence_threshold: 0.7,
        }
    }
}

/// CRM adapter selection and connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Adapter selector: "mock" or "odoo".
    pub adapter: String,
    pub url: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            adapter: "mock".to_string(),
            url: None,
            database: None,
            username: None,
            password: None,
        }
    }
}
