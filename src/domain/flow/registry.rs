//! Flow registry - validated, immutable flow definitions.
//!
//! Definitions are loaded once at startup (from a directory of YAML files or
//! from in-memory definitions) and never change afterwards. Every structural
//! error surfaces at load time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::action::ActionType;
use crate::domain::foundation::FlowId;

use super::definition::{FlowDefinition, StepKind};
use super::errors::FlowError;
use super::validation::validate_flow;

/// Read-only lookup table of flow definitions.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: HashMap<FlowId, Arc<FlowDefinition>>,
    default_flow: Option<FlowId>,
}

impl FlowRegistry {
    /// Builds a registry, validating every definition.
    ///
    /// # Errors
    ///
    /// - `Invalid` for any structurally malformed definition
    /// - `Duplicate` if two definitions share an id
    /// - `UnknownDefault` if `default_flow` is not among the definitions
    pub fn from_definitions(
        definitions: Vec<FlowDefinition>,
        default_flow: Option<FlowId>,
    ) -> Result<Self, FlowError> {
        let mut flows = HashMap::new();
        for definition in definitions {
            validate_flow(&definition)?;
            let id = definition.id.clone();
            if flows.insert(id.clone(), Arc::new(definition)).is_some() {
                return Err(FlowError::Duplicate(id));
            }
        }

        if let Some(default) = &default_flow {
            if !flows.contains_key(default) {
                return Err(FlowError::UnknownDefault(default.clone()));
            }
        }

        Ok(Self {
            flows,
            default_flow,
        })
    }

    /// Loads every `*.yaml` / `*.yml` file in `dir`.
    pub fn load_dir(dir: &Path, default_flow: Option<FlowId>) -> Result<Self, FlowError> {
        let io_err = |e: std::io::Error| FlowError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        };

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let source = std::fs::read_to_string(&path).map_err(|e| FlowError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let definition = Self::parse_yaml(&source).map_err(|message| FlowError::Parse {
                path: path.display().to_string(),
                message,
            })?;
            definitions.push(definition);
        }

        let registry = Self::from_definitions(definitions, default_flow)?;
        tracing::info!(
            directory = %dir.display(),
            flows = registry.len(),
            "Loaded flow definitions"
        );
        Ok(registry)
    }

    /// Parses a single YAML definition without validating it.
    pub fn parse_yaml(source: &str) -> Result<FlowDefinition, String> {
        serde_yaml::from_str(source).map_err(|e| e.to_string())
    }

    /// Returns the definition for `flow_id`.
    pub fn lookup(&self, flow_id: &FlowId) -> Result<Arc<FlowDefinition>, FlowError> {
        self.flows
            .get(flow_id)
            .cloned()
            .ok_or_else(|| FlowError::NotFound(flow_id.clone()))
    }

    pub fn default_flow(&self) -> Option<Arc<FlowDefinition>> {
        self.default_flow
            .as_ref()
            .and_then(|id| self.flows.get(id).cloned())
    }

    /// Picks the flow a contact without an open session should start:
    /// the first flow (by id) whose trigger matches, else the default flow.
    pub fn select_for(&self, text: Option<&str>) -> Option<Arc<FlowDefinition>> {
        if let Some(text) = text {
            let mut ids: Vec<&FlowId> = self.flows.keys().collect();
            ids.sort();
            for id in ids {
                let flow = &self.flows[id];
                if flow.is_triggered_by(text) {
                    return Some(flow.clone());
                }
            }
        }
        self.default_flow()
    }

    /// Fails if any action step uses an action outside `available`.
    pub fn ensure_actions(&self, available: &[ActionType]) -> Result<(), FlowError> {
        let mut ids: Vec<&FlowId> = self.flows.keys().collect();
        ids.sort();
        for id in ids {
            for step in &self.flows[id].steps {
                if let StepKind::Action { action, .. } = &step.kind {
                    if !available.contains(&action.action_type()) {
                        return Err(FlowError::UnregisteredAction {
                            flow_id: id.clone(),
                            step_id: step.id.clone(),
                            action: action.action_type(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
