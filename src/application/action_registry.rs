//! Startup-built lookup table from action type to handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::action::{ActionDescriptor, ActionType};
use crate::domain::flow::{FlowError, FlowRegistry};
use crate::ports::ActionHandler;

#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under the type its descriptor declares.
    /// A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        let action_type = handler.descriptor().action_type;
        self.handlers.insert(action_type, handler);
    }

    pub fn with(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type)
    }

    pub fn descriptor(&self, action_type: ActionType) -> Option<ActionDescriptor> {
        self.get(action_type).map(|h| h.descriptor())
    }

    /// Registered types in declaration order of [`ActionType::all`].
    pub fn registered_types(&self) -> Vec<ActionType> {
        ActionType::all()
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    /// Rejects flows that reference an action with no handler.
    pub fn check_flows(&self, flows: &FlowRegistry) -> Result<(), FlowError> {
        flows.ensure_actions(&self.registered_types())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::actions::SendMessageAction;
    use crate::domain::action::{ActionKind, ActionSpec};
    use crate::domain::flow::{FlowDefinition, Step, StepKind, Transition};
    use crate::domain::foundation::{FlowId, StepId};

    fn flow_with_order_step() -> FlowRegistry {
        let order = StepId::new("order").unwrap();
        let done = StepId::new("done").unwrap();
        let definition = FlowDefinition {
            id: FlowId::new("shop").unwrap(),
            version: 1,
            entry: order.clone(),
            description: None,
            triggers: vec![],
            steps: vec![
                Step::new(
                    order,
                    StepKind::Action {
                        action: ActionSpec::new(ActionKind::CreateOrder {
                            sku: "TEA".into(),
                            quantity: "1".into(),
                        }),
                        on_failure: None,
                    },
                )
                .with_transition(Transition::always(done.clone())),
                Step::new(done, StepKind::Terminal { text: None }),
            ],
        };
        FlowRegistry::from_definitions(vec![definition], None).unwrap()
    }

    #[test]
    fn handlers_are_keyed_by_descriptor_type() {
        let registry = ActionRegistry::new().with(Arc::new(SendMessageAction::new()));

        assert!(registry.get(ActionType::SendMessage).is_some());
        assert!(registry.get(ActionType::CreateOrder).is_none());
        assert_eq!(registry.registered_types(), vec![ActionType::SendMessage]);
    }

    #[test]
    fn flows_using_unregistered_actions_are_rejected() {
        let registry = ActionRegistry::new().with(Arc::new(SendMessageAction::new()));

        let err = registry.check_flows(&flow_with_order_step()).unwrap_err();
        assert!(matches!(err, FlowError::UnregisteredAction { .. }));
    }
}
