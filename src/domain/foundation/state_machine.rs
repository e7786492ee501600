//! State machine trait for status enums.
//!
//! Provides a consistent interface for validating and performing lifecycle
//! transitions of status enums such as `SessionStatus`.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors define valid state transitions and get validated
/// transition methods for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for JobState {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Queued, Running) | (Running, Done))
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Queued => vec![Running],
///             Running => vec![Done],
///             Done => vec![],
///         }
///     }
/// }
///
/// let next = current.transition_to(JobState::Running)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Lease {
        Free,
        Held,
        Expired,
    }

    impl StateMachine for Lease {
        fn can_transition_to(&self, target: &Self) -> bool {
            use Lease::*;
            matches!((self, target), (Free, Held) | (Held, Free) | (Held, Expired))
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use Lease::*;
            match self {
                Free => vec![Held],
                Held => vec![Free, Expired],
                Expired => vec![],
            }
        }
    }

    #[test]
    fn valid_transition_returns_target() {
        assert_eq!(Lease::Free.transition_to(Lease::Held), Ok(Lease::Held));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let err = Lease::Free.transition_to(Lease::Expired).unwrap_err();
        assert!(err.to_string().contains("Cannot transition from Free to Expired"));
    }

    #[test]
    fn terminal_means_no_outgoing_edges() {
        assert!(Lease::Expired.is_terminal());
        assert!(!Lease::Held.is_terminal());
    }

    #[test]
    fn can_transition_to_agrees_with_valid_transitions() {
        for state in [Lease::Free, Lease::Held, Lease::Expired] {
            for target in state.valid_transitions() {
                assert!(state.can_transition_to(&target));
            }
        }
    }
}
