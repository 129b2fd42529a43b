//! Per-session orchestration of the full request cycle.
//!
//! One logical worker per session: utterances for a session are queued and
//! processed strictly in arrival order, so the assistant turn answering
//! utterance `k` is always appended after the one answering `k-1`. Sessions
//! are independent; a slow CRM call in one session never blocks another.
//!
//! A channel closing mid-cycle does not cancel the in-flight dispatch: CRM
//! side effects, once started, run to completion and their result is
//! recorded in history even if nothing is listening live.

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use std::sync::Arc;
use std::time::Duration;

use crmpilot_types::error::OrchestratorError;
use crmpilot_types::intent::IntentKind;
use crmpilot_types::protocol::{InboundFrame, OutboundEnvelope, OutboundFrame};
use crmpilot_types::session::{SessionId, SessionMeta};
use crmpilot_types::turn::Turn;

use crate::adapter::CrmAdapter;
use crate::channel::ChannelHandle;
use crate::dispatch::OperationDispatcher;
use crate::emitter::{Outcome, ResponseEmitter};
use crate::history::HistoryRepository;
use crate::inference::IntentProvider;
use crate::pipeline::IntentPipeline;
use crate::registry::SessionRegistry;

/// Depth of each per-session utterance queue.
const WORKER_QUEUE_DEPTH: usize = 64;

struct Job {
    content: String,
    /// Present for the HTTP fallback path, which waits for the answer.
    reply: Option<oneshot::Sender<Turn>>,
}

/// Wires registry, pipeline, dispatcher, and emitter into the request cycle
/// and owns the arena of per-session workers.
pub struct Orchestrator<H, P, A> {
    registry: Arc<SessionRegistry>,
    pipeline: IntentPipeline<P, H>,
    dispatcher: OperationDispatcher<A>,
    emitter: ResponseEmitter<H>,
    workers: DashMap<SessionId, mpsc::Sender<Job>>,
}

impl<H, P, A> Orchestrator<H, P, A>
where
    H: HistoryRepository + 'static,
    P: IntentProvider + 'static,
    A: CrmAdapter + 'static,
{
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: IntentPipeline<P, H>,
        dispatcher: OperationDispatcher<A>,
        emitter: ResponseEmitter<H>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            pipeline,
            dispatcher,
            emitter,
            workers: DashMap::new(),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Bind a freshly connected channel as the session's live channel and
    /// greet the client. Creates the session on first contact.
    pub async fn join(self: &Arc<Self>, session_id: &SessionId, channel: ChannelHandle) {
        self.registry.bind(session_id, channel.clone());
        let greeting = OutboundEnvelope::now(
            session_id.clone(),
            OutboundFrame::StatusUpdate {
                status: "connected".to_string(),
                message: "Connected to the CRM assistant.".to_string(),
            },
        );
        if let Err(err) = channel.send(greeting).await {
            tracing::debug!(session = %session_id, error = %err, "join greeting not delivered");
        }
    }

    /// Route one inbound frame from the socket handler.
    pub async fn handle_frame(
        self: &Arc<Self>,
        session_id: &SessionId,
        frame: InboundFrame,
        channel: &ChannelHandle,
    ) {
        match frame {
            InboundFrame::JoinSession => self.join(session_id, channel.clone()).await,
            InboundFrame::Message { content } => {
                if let Err(err) = self.submit(session_id, content).await {
                    tracing::error!(session = %session_id, error = %err, "could not enqueue utterance");
                    self.emitter
                        .emit_system_error(
                            session_id,
                            "orchestrator-unavailable",
                            "Sorry, I couldn't take that request. Please try again.",
                        )
                        .await;
                }
            }
            InboundFrame::Typing { is_typing } => {
                // Ephemeral UI state; never persisted or forwarded, but a
                // typing client is an active client, so refresh the session.
                self.registry.touch(session_id);
                tracing::trace!(session = %session_id, is_typing, "client typing state");
            }
        }
    }

    /// Queue an utterance for FIFO processing on the session's worker.
    pub async fn submit(
        self: &Arc<Self>,
        session_id: &SessionId,
        content: String,
    ) -> Result<(), OrchestratorError> {
        self.enqueue(session_id, content, None).await
    }

    /// Queue an utterance and wait for its assistant turn. Used by the
    /// HTTP message endpoint, which has no push channel to answer on.
    pub async fn submit_and_wait(
        self: &Arc<Self>,
        session_id: &SessionId,
        content: String,
    ) -> Result<Turn, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(session_id, content, Some(tx)).await?;
        rx.await.map_err(|_| OrchestratorError::WorkerUnavailable)
    }

    async fn enqueue(
        self: &Arc<Self>,
        session_id: &SessionId,
        content: String,
        reply: Option<oneshot::Sender<Turn>>,
    ) -> Result<(), OrchestratorError> {
        self.registry.ensure(session_id);
        let sender = self.worker_sender(session_id);
        sender
            .send(Job { content, reply })
            .await
            .map_err(|_| OrchestratorError::WorkerUnavailable)
    }

    /// Get or spawn the session's worker, whose queue gives per-session
    /// mutual exclusion without any cross-session lock.
    fn worker_sender(self: &Arc<Self>, session_id: &SessionId) -> mpsc::Sender<Job> {
        self.workers
            .entry(session_id.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
                let orchestrator = Arc::clone(self);
                let session = session_id.clone();
                tokio::spawn(async move {
                    orchestrator.worker_loop(session, rx).await;
                });
                tx
            })
            .clone()
    }

    async fn worker_loop(self: Arc<Self>, session_id: SessionId, mut rx: mpsc::Receiver<Job>) {
        tracing::debug!(session = %session_id, "session worker started");
        while let Some(job) = rx.recv().await {
            let turn = self.process_one(&session_id, &job.content).await;
            if let (Some(reply), Some(turn)) = (job.reply, turn) {
                let _ = reply.send(turn);
            }
        }
        tracing::debug!(session = %session_id, "session worker stopped");
    }

    /// Run one full request cycle. Returns the terminal assistant turn,
    /// or None when even the history store was unreachable.
    async fn process_one(&self, session_id: &SessionId, content: &str) -> Option<Turn> {
        self.registry.record_message(session_id);
        self.push_best_effort(
            session_id,
            OutboundFrame::UserMessage {
                content: content.to_string(),
            },
        )
        .await;
        self.push_best_effort(session_id, OutboundFrame::Typing { is_typing: true })
            .await;

        let result = self.run_cycle(session_id, content).await;

        self.push_best_effort(session_id, OutboundFrame::Typing { is_typing: false })
            .await;
        result
    }

    async fn run_cycle(&self, session_id: &SessionId, content: &str) -> Option<Turn> {
        let (_, intent) = match self.pipeline.parse(session_id, content).await {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(session = %session_id, error = %err, "history store unreachable");
                self.emitter
                    .emit_system_error(
                        session_id,
                        "history-unavailable",
                        "Sorry, I couldn't record your message. Please try again.",
                    )
                    .await;
                return None;
            }
        };

        let outcome = if intent.kind == IntentKind::Unknown {
            Outcome::Clarification(intent)
        } else {
            Outcome::Operation(self.dispatcher.dispatch(&intent).await)
        };

        match self.emitter.emit(session_id, outcome).await {
            Ok(turn) => Some(turn),
            Err(err) => {
                tracing::error!(session = %session_id, error = %err, "failed to record assistant turn");
                None
            }
        }
    }

    async fn push_best_effort(&self, session_id: &SessionId, frame: OutboundFrame) {
        if let Some(channel) = self.registry.resolve(session_id) {
            let envelope = OutboundEnvelope::now(session_id.clone(), frame);
            if let Err(err) = channel.send(envelope).await {
                tracing::trace!(session = %session_id, error = %err, "best-effort frame dropped");
            }
        }
    }

    /// Session metadata, if the session exists.
    pub fn session_meta(&self, session_id: &SessionId) -> Option<SessionMeta> {
        self.registry.meta(session_id)
    }

    /// Sweep inactive sessions from the registry and tear down their
    /// workers once their queues settle.
    pub fn sweep(&self, ttl: Duration) {
        for session_id in self.registry.sweep(ttl) {
            // Dropping the sender ends the worker loop after queued jobs drain.
            self.workers.remove(&session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crmpilot_types::crm::{
        CustomerData, CustomerQuery, OperationResult, OrderData,
    };
    use crmpilot_types::error::{AdapterError, InferenceError};
    use crmpilot_types::intent::RawIntent;
    use crmpilot_types::turn::TurnRole;
    use serde_json::{Map, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that recognizes "create customer <name>" and "find <name>",
    /// and fails on "!timeout".
    struct TestProvider;

    impl IntentProvider for TestProvider {
        fn name(&self) -> &str {
            "test"
        }

        async fn infer(&self, utterance: &str, _window: &[Turn]) -> Result<RawIntent, InferenceError> {
            if utterance.contains("!unavailable") {
                return Err(InferenceError::Unavailable("down".to_string()));
            }
            let mut entities = BTreeMap::new();
            if let Some(name) = utterance.strip_prefix("create customer ") {
                entities.insert("name".to_string(), Value::from(name));
                return Ok(RawIntent {
                    action: "create".to_string(),
                    entity_type: "customer".to_string(),
                    entities,
                    confidence: 0.95,
                });
            }
            Ok(RawIntent {
                action: "chat".to_string(),
                entity_type: "smalltalk".to_string(),
                entities,
                confidence: 0.9,
            })
        }
    }

    /// Adapter that records call order and can be slowed per call.
    #[derive(Default)]
    struct CountingAdapter {
        calls: AtomicU32,
        delay: Option<Duration>,
        log: Mutex<Vec<String>>,
        failures_before_success: AtomicU32,
    }

    impl CountingAdapter {
        fn ok(&self, name: &str) -> Result<OperationResult, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(name.to_string());
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err(AdapterError::Network("flaky".to_string()));
            }
            let mut data = Map::new();
            data.insert("customer_id".to_string(), Value::from("c-1"));
            Ok(OperationResult::ok(format!("{name} done"), data))
        }
    }

    impl CrmAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn test_connection(&self) -> Result<OperationResult, AdapterError> {
            self.ok("test_connection")
        }

        async fn create_customer(
            &self,
            customer: &CustomerData,
        ) -> Result<OperationResult, AdapterError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.ok(&format!("create:{}", customer.name))
        }

        async fn search_customers(
            &self,
            _query: &CustomerQuery,
        ) -> Result<OperationResult, AdapterError> {
            self.ok("search_customers")
        }

        async fn update_customer(
            &self,
            _customer_id: &str,
            _update: &CustomerData,
        ) -> Result<OperationResult, AdapterError> {
            self.ok("update_customer")
        }

        async fn create_order(&self, _order: &OrderData) -> Result<OperationResult, AdapterError> {
            self.ok("create_order")
        }

        async fn search_products(
            &self,
            _query: &str,
            _limit: u32,
        ) -> Result<OperationResult, AdapterError> {
            self.ok("search_products")
        }
    }

    fn build(
        adapter: CountingAdapter,
    ) -> (
        Arc<Orchestrator<MemoryHistory, TestProvider, CountingAdapter>>,
        Arc<MemoryHistory>,
        Arc<SessionRegistry>,
    ) {
        let history = Arc::new(MemoryHistory::new());
        let registry = Arc::new(SessionRegistry::new());
        let pipeline = IntentPipeline::new(
            Arc::new(TestProvider),
            history.clone(),
            20,
            Duration::from_millis(200),
            0.7,
        );
        let dispatcher = OperationDispatcher::new(
            Arc::new(adapter),
            2,
            Duration::from_millis(1),
            Duration::from_secs(1),
        );
        let emitter = ResponseEmitter::new(history.clone(), registry.clone());
        (
            Orchestrator::new(registry.clone(), pipeline, dispatcher, emitter),
            history,
            registry,
        )
    }

    #[tokio::test]
    async fn one_utterance_one_assistant_turn_without_channel() {
        // Scenario: dispatch with no live channel; result visible via history.
        let (orchestrator, history, _) = build(CountingAdapter::default());
        let session = SessionId::from("s1");

        let turn = orchestrator
            .submit_and_wait(&session, "create customer Li Si".to_string())
            .await
            .unwrap();

        assert_eq!(turn.role, TurnRole::Assistant);
        assert_eq!(turn.payload.as_ref().unwrap()["customer_id"], "c-1");

        let turns = history.page(&session, 0, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn back_to_back_utterances_serialize_fifo() {
        // Scenario: the second dispatch starts only after the first settles.
        let adapter = CountingAdapter {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (orchestrator, history, _) = build(adapter);
        let session = SessionId::from("s1");

        orchestrator
            .submit(&session, "create customer First".to_string())
            .await
            .unwrap();
        let second = orchestrator
            .submit_and_wait(&session, "create customer Second".to_string())
            .await
            .unwrap();
        assert!(second.content.contains("Second"));

        let turns = history.page(&session, 0, 10).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "create customer First",
                "create:First done",
                "create customer Second",
                "create:Second done",
            ]
        );
        // Sequence numbers are gapless across the whole exchange.
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.seq, i as u64);
        }
    }

    #[tokio::test]
    async fn sessions_do_not_block_each_other() {
        let adapter = CountingAdapter {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let (orchestrator, _, _) = build(adapter);
        let slow = SessionId::from("slow");
        let fast = SessionId::from("fast");

        orchestrator
            .submit(&slow, "create customer Slowpoke".to_string())
            .await
            .unwrap();

        // The fast session's cycle completes while the slow one is still
        // inside its adapter call.
        let started = std::time::Instant::now();
        orchestrator
            .submit_and_wait(&fast, "!unavailable".to_string())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn inference_failure_never_calls_adapter() {
        // Scenario: provider unavailable yields a clarification turn only.
        let (orchestrator, _, _) = build(CountingAdapter::default());
        let session = SessionId::from("s1");

        let turn = orchestrator
            .submit_and_wait(&session, "!unavailable".to_string())
            .await
            .unwrap();

        assert_eq!(turn.error_code.as_deref(), Some("inference-unavailable"));
    }

    #[tokio::test]
    async fn transient_failures_recover_within_retry_bound() {
        // Scenario: two transient failures then success.
        let adapter = CountingAdapter {
            failures_before_success: AtomicU32::new(2),
            ..Default::default()
        };
        let (orchestrator, history, _) = build(adapter);
        let session = SessionId::from("s1");

        let turn = orchestrator
            .submit_and_wait(&session, "create customer Li Si".to_string())
            .await
            .unwrap();

        assert!(turn.content.contains("done"));
        // Exactly one assistant turn despite three attempts.
        let turns = history.page(&session, 0, 10).await.unwrap();
        let assistants = turns
            .iter()
            .filter(|t| t.role == TurnRole::Assistant)
            .count();
        assert_eq!(assistants, 1);
    }

    #[tokio::test]
    async fn unrecognized_utterance_yields_clarification() {
        let (orchestrator, _, _) = build(CountingAdapter::default());
        let session = SessionId::from("s1");

        let turn = orchestrator
            .submit_and_wait(&session, "tell me a joke".to_string())
            .await
            .unwrap();

        assert_eq!(turn.error_code.as_deref(), Some("unsupported-operation"));
    }

    #[tokio::test]
    async fn join_greets_over_the_new_channel() {
        let (orchestrator, _, _) = build(CountingAdapter::default());
        let session = SessionId::from("s1");
        let (channel, mut rx) = ChannelHandle::new(8);

        orchestrator.join(&session, channel).await;

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(
            envelope.frame,
            OutboundFrame::StatusUpdate { .. }
        ));
    }

    #[tokio::test]
    async fn typing_frame_refreshes_session_activity() {
        // Typing keeps an otherwise quiet session alive for the sweeper.
        let (orchestrator, _, registry) = build(CountingAdapter::default());
        let session = SessionId::from("s1");
        let (channel, _rx) = ChannelHandle::new(4);
        registry.bind(&session, channel.clone());

        let before = registry.meta(&session).unwrap().last_activity;
        tokio::time::sleep(Duration::from_millis(5)).await;
        orchestrator
            .handle_frame(&session, InboundFrame::Typing { is_typing: true }, &channel)
            .await;

        let after = registry.meta(&session).unwrap().last_activity;
        assert!(after > before);
        // No turn was recorded and the counter did not move.
        assert_eq!(registry.meta(&session).unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn channel_close_mid_dispatch_still_records_result() {
        let adapter = CountingAdapter {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (orchestrator, history, registry) = build(adapter);
        let session = SessionId::from("s1");
        let (channel, _rx) = ChannelHandle::new(8);
        registry.bind(&session, channel.clone());

        orchestrator
            .submit(&session, "create customer Li Si".to_string())
            .await
            .unwrap();
        channel.close();

        // Give the worker time to finish the cycle.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let turns = history.page(&session, 0, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }
}
