//! Action declarations embedded in flow definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::descriptor::IdempotencyStrategy;
use super::retry::RetryPolicy;

/// Discriminator of the closed set of actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendMessage,
    ShowCatalog,
    CreateOrder,
    InitiatePayment,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SendMessage => "send_message",
            ActionType::ShowCatalog => "show_catalog",
            ActionType::CreateOrder => "create_order",
            ActionType::InitiatePayment => "initiate_payment",
        }
    }

    pub fn all() -> [ActionType; 4] {
        [
            ActionType::SendMessage,
            ActionType::ShowCatalog,
            ActionType::CreateOrder,
            ActionType::InitiatePayment,
        ]
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action parameters, tagged by `type`.
///
/// String parameters may contain `{{variable}}` placeholders rendered from
/// the session's variables when the action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    SendMessage {
        text: String,
    },
    ShowCatalog {
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
    CreateOrder {
        sku: String,
        #[serde(default = "default_quantity")]
        quantity: String,
    },
    InitiatePayment {
        /// Amount in minor units, usually a placeholder such as
        /// `{{order.total_cents}}`.
        amount: String,
        currency: String,
        #[serde(default)]
        description: Option<String>,
        /// Message sent once the checkout link exists; may use
        /// `{{checkout_url}}` and `{{reference}}`.
        #[serde(default)]
        message: Option<String>,
    },
}

fn default_quantity() -> String {
    "1".to_string()
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::SendMessage { .. } => ActionType::SendMessage,
            ActionKind::ShowCatalog { .. } => ActionType::ShowCatalog,
            ActionKind::CreateOrder { .. } => ActionType::CreateOrder,
            ActionKind::InitiatePayment { .. } => ActionType::InitiatePayment,
        }
    }
}

/// An action as declared on an action step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Variables required in addition to the action's own requirements.
    #[serde(default)]
    pub required_inputs: Vec<String>,
    /// Overrides the engine's default retry policy.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Overrides the action's idempotency-key strategy.
    #[serde(default)]
    pub idempotency: Option<IdempotencyStrategy>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ActionSpec {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            required_inputs: Vec::new(),
            retry: None,
            idempotency: None,
            timeout_ms: None,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
