//! Application state wiring all collaborators together.
//!
//! The orchestrator is generic over the history store, intent provider, and
//! CRM adapter traits; AppState pins those generics to the concrete infra
//! implementations and hands the result to HTTP and WebSocket handlers.

use std::sync::Arc;
use std::time::Duration;

use crmpilot_core::dispatch::OperationDispatcher;
use crmpilot_core::emitter::ResponseEmitter;
use crmpilot_core::orchestrator::Orchestrator;
use crmpilot_core::pipeline::IntentPipeline;
use crmpilot_core::registry::SessionRegistry;
use crmpilot_infra::crm::AnyCrmAdapter;
use crmpilot_infra::inference::AnyIntentProvider;
use crmpilot_infra::sqlite::history::SqliteHistoryRepository;
use crmpilot_infra::sqlite::pool::DatabasePool;
use crmpilot_types::config::AppConfig;

/// Orchestrator pinned to the concrete infra implementations.
pub type ConcreteOrchestrator =
    Orchestrator<SqliteHistoryRepository, AnyIntentProvider, AnyCrmAdapter>;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub history: Arc<SqliteHistoryRepository>,
    pub adapter: Arc<AnyCrmAdapter>,
    pub provider: Arc<AnyIntentProvider>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connect to the database, build the adapter and provider selected by
    /// config, wire the request cycle, and start the inactivity sweeper.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = DatabasePool::new(&config.storage.database_url).await?;
        let history = Arc::new(SqliteHistoryRepository::new(pool));

        let adapter = Arc::new(AnyCrmAdapter::from_config(&config.crm)?);
        let provider = Arc::new(AnyIntentProvider::from_config(&config.inference)?);

        let registry = Arc::new(SessionRegistry::new());
        let pipeline = IntentPipeline::new(
            provider.clone(),
            history.clone(),
            config.conversation.window_turns,
            Duration::from_millis(config.inference.timeout_ms),
            config.inference.confidence_threshold,
        );
        let dispatcher = OperationDispatcher::new(
            adapter.clone(),
            config.dispatch.retry_limit,
            Duration::from_millis(config.dispatch.backoff_base_ms),
            Duration::from_millis(config.dispatch.adapter_timeout_ms),
        );
        let emitter = ResponseEmitter::new(history.clone(), registry.clone());

        let orchestrator = Orchestrator::new(registry, pipeline, dispatcher, emitter);

        spawn_sweeper(
            orchestrator.clone(),
            Duration::from_secs(config.session.sweep_interval_secs),
            Duration::from_secs(config.session.inactivity_secs),
        );

        Ok(Self {
            orchestrator,
            history,
            adapter,
            provider,
            config: Arc::new(config),
        })
    }
}

/// Periodically evict sessions idle past the ttl and tear down their workers.
fn spawn_sweeper(orchestrator: Arc<ConcreteOrchestrator>, interval: Duration, ttl: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            orchestrator.sweep(ttl);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmpilot_core::adapter::CrmAdapter;
    use crmpilot_core::inference::IntentProvider;

    async fn state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.database_url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("test.db").display()
        );
        (AppState::init(config).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn default_config_wires_mock_and_keyword() {
        let (state, _dir) = state().await;
        assert_eq!(state.adapter.name(), "mock");
        assert_eq!(state.provider.name(), "keyword");
    }

    #[tokio::test]
    async fn message_flows_end_to_end_through_concrete_stack() {
        let (state, _dir) = state().await;
        let session = crmpilot_types::session::SessionId::generate();

        let turn = state
            .orchestrator
            .submit_and_wait(
                &session,
                "create a customer named Wang Wu with email wangwu@example.com".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(turn.role, crmpilot_types::turn::TurnRole::Assistant);
        assert!(turn.payload.is_some());
    }
}
