//! `initiate_payment` action - starts a checkout with the payment gateway.
//!
//! The gateway answers with a payment reference; the action returns a
//! pending result keyed on that reference so the session suspends until the
//! gateway's callback arrives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::action::{
    ActionDescriptor, ActionError, ActionKind, ActionResult, ActionType, SideEffectCategory,
};
use crate::domain::foundation::CorrelationKey;
use crate::domain::session::OutboundBody;
use crate::ports::{ActionHandler, ActionRequest, PaymentGateway, PaymentRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct InitiatePaymentAction {
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl InitiatePaymentAction {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_amount(raw: &str) -> Result<i64, ActionError> {
    let amount: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ActionError::InvalidParameters(format!("amount '{}' is not an integer", raw)))?;
    if amount <= 0 {
        return Err(ActionError::InvalidParameters("amount must be positive".into()));
    }
    Ok(amount)
}

#[async_trait]
impl ActionHandler for InitiatePaymentAction {
    fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor::new(ActionType::InitiatePayment, SideEffectCategory::ExternalApiCall)
            .suspending()
            .timeout(self.timeout)
    }

    async fn execute(&self, request: ActionRequest) -> Result<ActionResult, ActionError> {
        let ActionKind::InitiatePayment {
            amount,
            currency,
            description,
            message,
        } = &request.kind
        else {
            return Err(ActionError::InvalidParameters(format!(
                "expected initiate_payment, got {}",
                request.kind.action_type()
            )));
        };

        let amount_cents = parse_amount(&request.render(amount))?;
        let initiation = self
            .gateway
            .initiate(PaymentRequest {
                idempotency_key: request.idempotency_key.clone(),
                contact_id: request.contact_id.clone(),
                amount_cents,
                currency: request.render(currency),
                description: description.as_deref().map(|d| request.render(d)),
            })
            .await?;

        let key = CorrelationKey::new(initiation.reference.clone()).map_err(|_| {
            ActionError::Rejected("gateway returned an empty payment reference".into())
        })?;

        let mut result = ActionResult::ok()
            .with_output("reference", initiation.reference.clone())
            .with_output("checkout_url", initiation.checkout_url.clone())
            .with_output("amount_cents", amount_cents);

        if let Some(template) = message {
            let mut scoped = request.variables.clone();
            scoped.set_scoped(&request.step_id, "reference", initiation.reference.clone());
            scoped.set_scoped(&request.step_id, "checkout_url", initiation.checkout_url.clone());
            let text = crate::domain::flow::render(template, &scoped, &request.step_id);
            result = result.with_message(OutboundBody::text(text));
        }

        Ok(result.pending_on(key))
    }
}
