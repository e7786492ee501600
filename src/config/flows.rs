//! Flow definition source

use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::foundation::FlowId;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowsConfig {
    /// Directory of `*.yaml` flow definitions
    pub directory: PathBuf,

    /// Flow started when no trigger matches an inbound message
    pub default_flow: Option<String>,
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("flows"),
            default_flow: None,
        }
    }
}

impl FlowsConfig {
    pub fn default_flow_id(&self) -> Result<Option<FlowId>, ValidationError> {
        self.default_flow
            .as_deref()
            .map(|id| FlowId::new(id).map_err(|_| ValidationError::MissingRequired("FLOWS__DEFAULT_FLOW")))
            .transpose()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ValidationError::MissingRequired("FLOWS__DIRECTORY"));
        }
        self.default_flow_id()?;
        Ok(())
    }
}
