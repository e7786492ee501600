//! Shared harness for the integration tests: a fully wired engine on top of
//! the in-memory adapters.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use convoflow::adapters::actions::{
    CreateOrderAction, InitiatePaymentAction, SendMessageAction, ShowCatalogAction,
};
use convoflow::adapters::memory::{
    InMemoryContactLock, InMemoryInvocationLog, InMemoryOrderStore, InMemorySessionStore,
    InMemoryTaskQueue, MockPaymentGateway, RecordingMessageSender, StaticCatalog,
};
use convoflow::application::{
    ActionExecutor, ActionRegistry, ConcurrencyGuard, Disposition, EngineError, EngineSettings,
    FlowEngine, GuardSettings, Interpreter, InterpreterSettings, JobHandler, JobRegistry,
    OutboxRelay, OutboxRelayConfig,
};
use convoflow::domain::flow::FlowRegistry;
use convoflow::domain::foundation::{ContactId, CorrelationKey, FlowId, Timestamp};
use convoflow::domain::job::Job;
use convoflow::domain::session::{InboundMessage, Session};
use convoflow::ports::TaskQueue;

/// Directory of the flows shipped with the service.
pub fn bundled_flows_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("flows")
}

pub fn contact(id: &str) -> ContactId {
    ContactId::new(id).unwrap()
}

pub fn key(k: &str) -> CorrelationKey {
    CorrelationKey::new(k).unwrap()
}

pub fn inbound(message_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        message_id: message_id.to_string(),
        channel: "whatsapp".to_string(),
        payload: json!({ "text": text }),
        received_at: Timestamp::now(),
    }
}

pub struct HarnessBuilder {
    flows: FlowRegistry,
    interpreter: InterpreterSettings,
    engine: EngineSettings,
    guard: GuardSettings,
    payments: MockPaymentGateway,
}

impl HarnessBuilder {
    pub fn bundled() -> Self {
        let flows = FlowRegistry::load_dir(&bundled_flows_dir(), None).unwrap();
        Self::with_flows(flows)
    }

    /// Bundled flows, with `flow_id` started for messages matching no trigger.
    pub fn bundled_with_default(flow_id: &str) -> Self {
        let default = Some(FlowId::new(flow_id).unwrap());
        let flows = FlowRegistry::load_dir(&bundled_flows_dir(), default).unwrap();
        Self::with_flows(flows)
    }

    pub fn from_yaml(sources: &[&str]) -> Self {
        let definitions = sources
            .iter()
            .map(|s| FlowRegistry::parse_yaml(s).unwrap())
            .collect();
        Self::with_flows(FlowRegistry::from_definitions(definitions, None).unwrap())
    }

    fn with_flows(flows: FlowRegistry) -> Self {
        Self {
            flows,
            interpreter: InterpreterSettings::default(),
            engine: EngineSettings::default(),
            guard: GuardSettings {
                wait_timeout: std::time::Duration::from_secs(2),
                poll_interval: std::time::Duration::from_millis(5),
                ..GuardSettings::default()
            },
            payments: MockPaymentGateway::new(),
        }
    }

    pub fn payments(mut self, payments: MockPaymentGateway) -> Self {
        self.payments = payments;
        self
    }

    pub fn interpreter(mut self, settings: InterpreterSettings) -> Self {
        self.interpreter = settings;
        self
    }

    pub fn guard(mut self, settings: GuardSettings) -> Self {
        self.guard = settings;
        self
    }

    pub fn build(self) -> Harness {
        let sessions = Arc::new(InMemorySessionStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let sender = Arc::new(RecordingMessageSender::new());
        let invocations = Arc::new(InMemoryInvocationLog::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let leases = Arc::new(InMemoryContactLock::new());
        let catalog = Arc::new(StaticCatalog::demo());
        let payments = Arc::new(self.payments);

        let actions = ActionRegistry::new()
            .with(Arc::new(SendMessageAction::new()))
            .with(Arc::new(ShowCatalogAction::new(catalog.clone())))
            .with(Arc::new(CreateOrderAction::new(catalog, orders.clone())))
            .with(Arc::new(InitiatePaymentAction::new(payments.clone())));
        actions.check_flows(&self.flows).unwrap();

        let executor = Arc::new(ActionExecutor::new(actions, invocations.clone()));
        let interpreter = Arc::new(Interpreter::new(
            Arc::new(self.flows),
            executor,
            self.interpreter,
        ));
        let relay = Arc::new(OutboxRelay::new(
            sessions.clone(),
            sender.clone(),
            queue.clone(),
            OutboxRelayConfig::default(),
        ));
        let guard = Arc::new(ConcurrencyGuard::new(leases.clone(), self.guard));
        let engine = Arc::new(
            FlowEngine::new(sessions.clone(), guard, interpreter, queue.clone(), self.engine)
                .with_relay(relay.clone()),
        );

        Harness {
            jobs: JobRegistry::for_engine(engine.clone()),
            engine,
            sessions,
            queue,
            sender,
            invocations,
            orders,
            leases,
            payments,
            relay,
        }
    }
}

pub struct Harness {
    pub engine: Arc<FlowEngine>,
    pub jobs: JobRegistry,
    pub sessions: Arc<InMemorySessionStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub sender: Arc<RecordingMessageSender>,
    pub invocations: Arc<InMemoryInvocationLog>,
    pub orders: Arc<InMemoryOrderStore>,
    pub leases: Arc<InMemoryContactLock>,
    pub payments: Arc<MockPaymentGateway>,
    pub relay: Arc<OutboxRelay>,
}

impl Harness {
    pub async fn say(
        &self,
        contact_id: &ContactId,
        message_id: &str,
        text: &str,
    ) -> Result<Disposition, EngineError> {
        self.engine
            .handle_inbound_event(contact_id, inbound(message_id, text))
            .await
    }

    pub async fn callback(&self, k: &str, payload: Value) -> Result<Disposition, EngineError> {
        self.engine.handle_external_callback(&key(k), payload).await
    }

    /// Runs every queued job, ignoring due times, until the queue is empty
    /// or `limit` jobs ran. Returns the number of jobs run.
    pub async fn run_jobs(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit {
            let batch: Vec<Job> = self.queue.drain().await;
            if batch.is_empty() {
                break;
            }
            for job in batch {
                let handler = self.jobs.get(job.kind.name()).unwrap();
                handler.handle(&job).await.unwrap();
                ran += 1;
            }
        }
        ran
    }

    pub async fn enqueue(&self, job: Job) {
        self.queue.schedule_now(job).await.unwrap();
    }

    pub async fn latest(&self, contact_id: &ContactId) -> Session {
        self.sessions
            .sessions_for(contact_id)
            .await
            .pop()
            .expect("contact has a session")
    }

    pub fn texts(&self, contact_id: &ContactId) -> Vec<String> {
        self.sender.texts_for(contact_id)
    }

    pub fn last_text(&self, contact_id: &ContactId) -> String {
        self.texts(contact_id).pop().unwrap_or_default()
    }
}
