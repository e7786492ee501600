//! ActionHandler port - the common interface of every action implementation.
//!
//! Handlers are registered once at startup in a lookup table keyed by
//! [`ActionType`]; the action executor dispatches on the spec's tag.

use async_trait::async_trait;

use crate::domain::action::{ActionDescriptor, ActionError, ActionKind, ActionResult};
use crate::domain::foundation::{ContactId, SessionId, StepId};
use crate::domain::session::VariableBag;

/// Everything a handler needs to run one invocation.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub session_id: SessionId,
    pub contact_id: ContactId,
    pub step_id: StepId,
    /// Key the handler must pass to remote systems to deduplicate effects.
    pub idempotency_key: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Snapshot of the session's variables.
    pub variables: VariableBag,
}

impl ActionRequest {
    /// Renders a parameter template against the session's variables.
    pub fn render(&self, template: &str) -> String {
        crate::domain::flow::render(template, &self.variables, &self.step_id)
    }
}

/// Port implemented by each action in the closed set.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Static declaration: inputs, side effect, idempotency, suspension.
    fn descriptor(&self) -> ActionDescriptor;

    /// Runs the action. Must be idempotent on `request.idempotency_key`.
    async fn execute(&self, request: ActionRequest) -> Result<ActionResult, ActionError>;
}
