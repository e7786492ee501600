//! ActionExecutor - invokes declared actions with timeouts and deduplication.
//!
//! ## Execution steps
//!
//! 1. Resolve the handler from the [`ActionRegistry`]
//! 2. Check required inputs (handler's own plus the step's extras)
//! 3. Replay a recorded result if this invocation id already ran
//! 4. Derive the idempotency key handed to remote systems
//! 5. Run the handler under a bounded timeout and record the result
//!
//! Retrying is not done here: a retryable error is returned to the
//! interpreter, which schedules the next attempt through the task queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::action::{
    ActionError, ActionResult, ActionSpec, IdempotencyStrategy, RetryPolicy,
};
use crate::domain::foundation::{InvocationId, Timestamp};
use crate::domain::session::Session;
use crate::ports::{ActionRequest, InvocationLog, InvocationRecord, SaveResult};

use super::action_registry::ActionRegistry;

/// Defaults applied when neither the step nor the handler declares one.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub default_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ActionExecutor {
    registry: ActionRegistry,
    log: Arc<dyn InvocationLog>,
    settings: ExecutorSettings,
}

impl ActionExecutor {
    pub fn new(registry: ActionRegistry, log: Arc<dyn InvocationLog>) -> Self {
        Self::with_settings(registry, log, ExecutorSettings::default())
    }

    pub fn with_settings(
        registry: ActionRegistry,
        log: Arc<dyn InvocationLog>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            log,
            settings,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Retry policy for a step: the step's override, else the default.
    pub fn retry_policy(&self, spec: &ActionSpec) -> RetryPolicy {
        spec.retry.clone().unwrap_or_else(|| self.settings.retry.clone())
    }

    /// Runs `spec` for the session's current step.
    ///
    /// `invocation_id` identifies this exact attempt; a crash-and-replay of
    /// the same turn produces the same id and gets the recorded result back
    /// without re-running the handler.
    pub async fn execute(
        &self,
        spec: &ActionSpec,
        session: &Session,
        invocation_id: &InvocationId,
        attempt: u32,
    ) -> Result<ActionResult, ActionError> {
        let action_type = spec.action_type();
        let handler = self
            .registry
            .get(action_type)
            .ok_or(ActionError::NotRegistered(action_type))?;
        let descriptor = handler.descriptor();
        let step_id = session.current_step();

        let missing: Vec<String> = descriptor
            .required_inputs
            .iter()
            .chain(spec.required_inputs.iter())
            .filter(|name| session.variables().resolve(name, step_id).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ActionError::MissingInput(missing));
        }

        if let Some(record) = self
            .log
            .get(invocation_id)
            .await
            .map_err(|e| ActionError::Transport(e.to_string()))?
        {
            debug!(
                invocation_id = %invocation_id,
                action = %action_type,
                "Replaying recorded action result"
            );
            return Ok(record.result);
        }

        let strategy = spec
            .idempotency
            .clone()
            .unwrap_or_else(|| descriptor.idempotency.clone());
        let idempotency_key = idempotency_key(&strategy, session, invocation_id)?;

        let timeout = spec
            .timeout()
            .or(descriptor.timeout)
            .unwrap_or(self.settings.default_timeout);

        let request = ActionRequest {
            kind: spec.kind.clone(),
            session_id: *session.id(),
            contact_id: session.contact_id().clone(),
            step_id: step_id.clone(),
            idempotency_key,
            attempt,
            variables: session.variables().clone(),
        };

        let outcome = match tokio::time::timeout(timeout, handler.execute(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ActionError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    invocation_id = %invocation_id,
                    action = %action_type,
                    attempt,
                    retryable = err.is_retryable(),
                    error = %err,
                    "Action attempt failed"
                );
                return Err(err);
            }
        };

        let record = InvocationRecord {
            invocation_id: invocation_id.clone(),
            action_type,
            result: result.clone(),
            recorded_at: Timestamp::now(),
        };
        match self.log.record(record).await {
            Ok(SaveResult::Inserted) => {}
            Ok(SaveResult::AlreadyExists) => {
                debug!(invocation_id = %invocation_id, "Invocation already recorded");
            }
            Err(e) => {
                // The effect already happened; the remote side dedups on the key.
                warn!(invocation_id = %invocation_id, error = %e, "Failed to record invocation");
            }
        }

        info!(
            invocation_id = %invocation_id,
            action = %action_type,
            attempt,
            success = result.success,
            pending = result.pending.is_some(),
            "Action executed"
        );
        Ok(result)
    }
}

fn idempotency_key(
    strategy: &IdempotencyStrategy,
    session: &Session,
    invocation_id: &InvocationId,
) -> Result<String, ActionError> {
    let step_id = session.current_step();
    match strategy {
        IdempotencyStrategy::PerAttempt => Ok(invocation_id.to_string()),
        IdempotencyStrategy::PerStepVisit => {
            let entered = session.position().entered_version.to_string();
            Ok(InvocationId::from_parts(&[
                &session.id().to_string(),
                step_id.as_str(),
                &entered,
                "visit",
            ])
            .to_string())
        }
        IdempotencyStrategy::Variable(name) => session
            .variables()
            .resolve_text(name, step_id)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ActionError::MissingInput(vec![name.clone()])),
    }
}
