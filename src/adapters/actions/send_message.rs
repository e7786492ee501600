//! `send_message` action - stages a rendered text message.

use async_trait::async_trait;

use crate::domain::action::{
    ActionDescriptor, ActionError, ActionKind, ActionResult, ActionType, SideEffectCategory,
};
use crate::domain::session::OutboundBody;
use crate::ports::{ActionHandler, ActionRequest};

/// Sends a text message. Delivery happens through the outbox after commit.
#[derive(Debug, Default, Clone)]
pub struct SendMessageAction;

impl SendMessageAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionHandler for SendMessageAction {
    fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor::new(ActionType::SendMessage, SideEffectCategory::OutboundMessage)
    }

    async fn execute(&self, request: ActionRequest) -> Result<ActionResult, ActionError> {
        let ActionKind::SendMessage { text } = &request.kind else {
            return Err(ActionError::InvalidParameters(format!(
                "expected send_message, got {}",
                request.kind.action_type()
            )));
        };

        let rendered = request.render(text);
        if rendered.trim().is_empty() {
            return Err(ActionError::InvalidParameters("message text is empty".into()));
        }

        Ok(ActionResult::ok()
            .with_output("text", rendered.clone())
            .with_message(OutboundBody::text(rendered)))
    }
}
