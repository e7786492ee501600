//! Action handlers - one implementation per action variant.

mod create_order;
mod initiate_payment;
mod send_message;
mod show_catalog;

pub use create_order::CreateOrderAction;
pub use initiate_payment::InitiatePaymentAction;
pub use send_message::SendMessageAction;
pub use show_catalog::ShowCatalogAction;

#[cfg(test)]
pub(crate) fn test_request(kind: crate::domain::action::ActionKind) -> crate::ports::ActionRequest {
    use crate::domain::foundation::{ContactId, SessionId, StepId};
    use crate::domain::session::VariableBag;

    crate::ports::ActionRequest {
        kind,
        session_id: SessionId::new(),
        contact_id: ContactId::new("+15550100").unwrap(),
        step_id: StepId::new("act").unwrap(),
        idempotency_key: "idem-1".into(),
        attempt: 1,
        variables: VariableBag::new(),
    }
}
