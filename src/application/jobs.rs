//! Job handlers - what the worker pool runs for each job kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::job::{Job, JobKind};

use super::engine::{Disposition, FlowEngine};
use super::errors::EngineError;

/// Executes one kind of job.
///
/// Handlers must tolerate redelivery: a job whose worker crashed before
/// completing it is claimed again after its visibility timeout.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), EngineError>;

    /// Matches [`JobKind::name`] of the jobs this handler runs.
    fn name(&self) -> &'static str;
}

#[derive(Default, Clone)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn with(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Registry with the engine's own job kinds.
    pub fn for_engine(engine: Arc<FlowEngine>) -> Self {
        Self::new()
            .with(Arc::new(ProcessEventHandler::new(engine.clone())))
            .with(Arc::new(ProcessCallbackHandler::new(engine)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }
}

/// Feeds a queued event (inbound message, retry timeout) to its contact.
pub struct ProcessEventHandler {
    engine: Arc<FlowEngine>,
}

impl ProcessEventHandler {
    pub fn new(engine: Arc<FlowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for ProcessEventHandler {
    async fn handle(&self, job: &Job) -> Result<(), EngineError> {
        let JobKind::ProcessEvent { contact_id, event } = &job.kind else {
            return Ok(());
        };
        let disposition = self
            .engine
            .process(contact_id, event.clone(), job.attempt)
            .await?;
        log_disposition(job, &disposition);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "process_event"
    }
}

/// Correlates a queued external callback and feeds it to its session.
pub struct ProcessCallbackHandler {
    engine: Arc<FlowEngine>,
}

impl ProcessCallbackHandler {
    pub fn new(engine: Arc<FlowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for ProcessCallbackHandler {
    async fn handle(&self, job: &Job) -> Result<(), EngineError> {
        let JobKind::ProcessCallback {
            correlation_key,
            payload,
        } = &job.kind
        else {
            return Ok(());
        };
        let disposition = self
            .engine
            .handle_external_callback_attempt(correlation_key, payload.clone(), job.attempt)
            .await?;
        log_disposition(job, &disposition);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "process_callback"
    }
}

fn log_disposition(job: &Job, disposition: &Disposition) {
    debug!(job_id = %job.id, kind = job.kind.name(), ?disposition, "Job handled");
}
