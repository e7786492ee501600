//! Flow definitions: immutable step graphs authored as YAML.
//!
//! ```yaml
//! id: confirm
//! version: 2
//! entry: ask
//! triggers: [confirm]
//! steps:
//!   - id: ask
//!     type: input
//!     prompt: "Continue? (yes/no)"
//!     expects: { kind: choices, options: ["yes", "no"] }
//!     transitions:
//!       - to: done
//!         when: { equals: { var: input, value: "yes" } }
//!       - to: bye
//!         when: { equals: { var: input, value: "no" } }
//!   - id: done
//!     type: terminal
//!     text: "Great!"
//!   - id: bye
//!     type: terminal
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::action::ActionSpec;
use crate::domain::condition::Predicate;
use crate::domain::foundation::{FlowId, StepId};

use super::expectation::InputExpectation;

/// An edge of the step graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub to: StepId,
    /// Written in map form, e.g. `{ equals: { var: input, value: "yes" } }`.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub when: Predicate,
    /// Lower values are evaluated first; ties keep declaration order.
    #[serde(default)]
    pub priority: i32,
}

impl Transition {
    pub fn always(to: StepId) -> Self {
        Self {
            to,
            when: Predicate::Always,
            priority: 0,
        }
    }

    pub fn when(to: StepId, when: Predicate) -> Self {
        Self {
            to,
            when,
            priority: 0,
        }
    }
}

/// Per-type step behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Emit a message, then auto-transition.
    Message { text: String },
    /// Prompt, then wait for a matching inbound message.
    Input {
        prompt: String,
        #[serde(default)]
        reprompt: Option<String>,
        #[serde(default)]
        expects: InputExpectation,
        /// Defaults to the engine's configured value.
        #[serde(default)]
        max_reprompts: Option<u32>,
        /// Taken once reprompts are exhausted.
        #[serde(default)]
        fallback: Option<StepId>,
        /// Also store the accepted input under this top-level name.
        #[serde(default)]
        save_as: Option<String>,
    },
    /// Invoke an action, synchronously or suspending.
    Action {
        action: ActionSpec,
        #[serde(default)]
        on_failure: Option<StepId>,
    },
    /// Pure routing on predicates.
    Branch,
    /// Close the session.
    Terminal {
        #[serde(default)]
        text: Option<String>,
    },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Message { .. } => "message",
            StepKind::Input { .. } => "input",
            StepKind::Action { .. } => "action",
            StepKind::Branch => "branch",
            StepKind::Terminal { .. } => "terminal",
        }
    }
}

/// One node of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Reachable only from outside the graph (exempt from the orphan check).
    #[serde(default)]
    pub subflow_entry: bool,
}

impl Step {
    pub fn new(id: StepId, kind: StepKind) -> Self {
        Self {
            id,
            kind,
            transitions: Vec::new(),
            subflow_entry: false,
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StepKind::Terminal { .. })
    }

    /// Transitions in evaluation order.
    pub fn ordered_transitions(&self) -> Vec<&Transition> {
        let mut ordered: Vec<&Transition> = self.transitions.iter().collect();
        ordered.sort_by_key(|t| t.priority);
        ordered
    }

    /// Every step this step can lead to, including failure edges.
    pub fn successors(&self) -> Vec<&StepId> {
        let mut out: Vec<&StepId> = self.transitions.iter().map(|t| &t.to).collect();
        match &self.kind {
            StepKind::Input {
                fallback: Some(target),
                ..
            } => out.push(target),
            StepKind::Action {
                on_failure: Some(target),
                ..
            } => out.push(target),
            _ => {}
        }
        out
    }
}

fn default_version() -> u32 {
    1
}

/// A named directed graph of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: FlowId,
    #[serde(default = "default_version")]
    pub version: u32,
    pub entry: StepId,
    #[serde(default)]
    pub description: Option<String>,
    /// Keywords that start this flow for a contact without an open session.
    #[serde(default)]
    pub triggers: Vec<String>,
    pub steps: Vec<Step>,
}

impl FlowDefinition {
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.step(id).is_some()
    }

    /// Whether `text` selects this flow.
    pub fn is_triggered_by(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.triggers.iter().any(|trigger| {
            let trigger = trigger.trim().to_lowercase();
            !trigger.is_empty()
                && (text == trigger || text.starts_with(&format!("{} ", trigger)))
        })
    }
}
