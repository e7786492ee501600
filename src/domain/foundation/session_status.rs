//! SessionStatus enum for tracking the lifecycle of a conversation session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{StateMachine, ValidationError};

/// Lifecycle status of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    WaitingExternal,
    Completed,
    Errored,
}

impl SessionStatus {
    /// Returns true while the session can still consume events.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::WaitingExternal)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::WaitingExternal => "waiting_external",
            SessionStatus::Completed => "completed",
            SessionStatus::Errored => "errored",
        }
    }
}

impl StateMachine for SessionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SessionStatus::*;
        matches!(
            (self, target),
            (Active, WaitingExternal)
                | (Active, Completed)
                | (Active, Errored)
                | (WaitingExternal, Active)
                | (WaitingExternal, Completed)
                | (WaitingExternal, Errored)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionStatus::*;
        match self {
            Active => vec![WaitingExternal, Completed, Errored],
            WaitingExternal => vec![Active, Completed, Errored],
            Completed | Errored => vec![],
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "waiting_external" => Ok(SessionStatus::WaitingExternal),
            "completed" => Ok(SessionStatus::Completed),
            "errored" => Ok(SessionStatus::Errored),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown session status '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_active() {
        assert_eq!(SessionStatus::default(), SessionStatus::Active);
    }

    #[test]
    fn open_statuses() {
        assert!(SessionStatus::Active.is_open());
        assert!(SessionStatus::WaitingExternal.is_open());
        assert!(!SessionStatus::Completed.is_open());
        assert!(!SessionStatus::Errored.is_open());
    }

    #[test]
    fn waiting_external_can_resume() {
        assert!(SessionStatus::WaitingExternal.can_transition_to(&SessionStatus::Active));
        assert!(SessionStatus::Active.can_transition_to(&SessionStatus::WaitingExternal));
    }

    #[test]
    fn closed_statuses_are_terminal() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Errored.is_terminal());
        assert!(SessionStatus::Completed
            .transition_to(SessionStatus::Active)
            .is_err());
    }

    #[test]
    fn storage_form_roundtrips() {
        for status in [
            SessionStatus::Active,
            SessionStatus::WaitingExternal,
            SessionStatus::Completed,
            SessionStatus::Errored,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("archived".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn serializes_to_snake_case_json() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::WaitingExternal).unwrap(),
            "\"waiting_external\""
        );
    }
}
