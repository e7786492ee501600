//! External event correlator - maps callback keys to suspended sessions.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::foundation::CorrelationKey;
use crate::ports::{CorrelationRecord, SessionRepository};

use super::errors::EngineError;

/// Outcome of resolving a correlation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// A session registered this key and is still waiting on it.
    Pending(CorrelationRecord),
    /// The key was already consumed; redelivered callbacks are no-ops.
    AlreadyResolved(CorrelationRecord),
    NotFound,
}

pub struct ExternalEventCorrelator {
    sessions: Arc<dyn SessionRepository>,
}

impl ExternalEventCorrelator {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    pub async fn resolve(&self, key: &CorrelationKey) -> Result<Correlation, EngineError> {
        match self.sessions.find_correlation(key).await? {
            None => {
                warn!(correlation_key = %key, "{}", EngineError::CorrelationNotFound(key.clone()));
                Ok(Correlation::NotFound)
            }
            Some(record) if record.is_resolved() => {
                info!(
                    correlation_key = %key,
                    session_id = %record.session_id,
                    "Callback for an already resolved key; ignoring"
                );
                Ok(Correlation::AlreadyResolved(record))
            }
            Some(record) => Ok(Correlation::Pending(record)),
        }
    }
}
