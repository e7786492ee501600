//! Session aggregate entity.
//!
//! A session is the live instance of a flow bound to one contact. It records
//! where the contact is in the step graph, the variables collected so far,
//! and a monotonic version used for optimistic concurrency.
//!
//! # Versioning
//!
//! A freshly started session has version 0 and has never been stored. Each
//! committed turn bumps the version by exactly one; the repository rejects a
//! write whose expected version is not the stored one.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::foundation::{
    ContactId, CorrelationKey, DomainError, ErrorCode, FlowId, SessionId, SessionStatus,
    StateMachine, StepId, Timestamp,
};

use super::variables::VariableBag;

/// Why a session is paused at an action step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Suspension {
    /// Waiting for an external callback carrying this key.
    AwaitingCallback { correlation_key: CorrelationKey },
    /// A failed attempt is scheduled to run again.
    RetryScheduled { attempt: u32, due_at: Timestamp },
}

/// The session's place in its flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub step_id: StepId,
    /// Session version at the moment this step was entered.
    pub entered_version: u64,
    /// The step's entry effect (message, prompt or action) already ran.
    #[serde(default)]
    pub effects_done: bool,
    #[serde(default)]
    pub reprompt_count: u32,
    #[serde(default)]
    pub action_attempts: u32,
    #[serde(default)]
    pub suspension: Option<Suspension>,
}

impl Position {
    fn enter(step_id: StepId, version: u64) -> Self {
        Self {
            step_id,
            entered_version: version,
            effects_done: false,
            reprompt_count: 0,
            action_attempts: 0,
            suspension: None,
        }
    }
}

/// Session aggregate.
///
/// # Invariants
///
/// - exactly one current step at any time
/// - `WaitingExternal` iff the position carries an `AwaitingCallback` suspension
/// - closed sessions (`Completed`, `Errored`) are never modified again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    contact_id: ContactId,
    flow_id: FlowId,
    flow_version: u32,
    status: SessionStatus,
    position: Position,
    variables: VariableBag,
    recent_messages: VecDeque<String>,
    closed_reason: Option<String>,
    diagnostic: Option<String>,
    version: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Session {
    /// Starts a new, not yet persisted session at the flow's entry step.
    pub fn start(
        contact_id: ContactId,
        flow_id: FlowId,
        flow_version: u32,
        entry: StepId,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SessionId::new(),
            contact_id,
            flow_id,
            flow_version,
            status: SessionStatus::Active,
            position: Position::enter(entry, 0),
            variables: VariableBag::new(),
            recent_messages: VecDeque::new(),
            closed_reason: None,
            diagnostic: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitute a session from persistence (no validation).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: SessionId,
        contact_id: ContactId,
        flow_id: FlowId,
        flow_version: u32,
        status: SessionStatus,
        position: Position,
        variables: VariableBag,
        recent_messages: VecDeque<String>,
        closed_reason: Option<String>,
        diagnostic: Option<String>,
        version: u64,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            contact_id,
            flow_id,
            flow_version,
            status,
            position,
            variables,
            recent_messages,
            closed_reason,
            diagnostic,
            version,
            created_at,
            updated_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn contact_id(&self) -> &ContactId {
        &self.contact_id
    }

    pub fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }

    pub fn flow_version(&self) -> u32 {
        self.flow_version
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Mutable access for the interpreter's per-step bookkeeping.
    pub fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    pub fn current_step(&self) -> &StepId {
        &self.position.step_id
    }

    pub fn variables(&self) -> &VariableBag {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableBag {
        &mut self.variables
    }

    pub fn recent_messages(&self) -> &VecDeque<String> {
        &self.recent_messages
    }

    pub fn closed_reason(&self) -> Option<&str> {
        self.closed_reason.as_deref()
    }

    /// Human-reviewable explanation of why the session errored.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True until the session is first committed.
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn updated_at(&self) -> &Timestamp {
        &self.updated_at
    }

    /// The correlation key the session is suspended on, if any.
    pub fn awaiting_correlation(&self) -> Option<&CorrelationKey> {
        match &self.position.suspension {
            Some(Suspension::AwaitingCallback { correlation_key }) => Some(correlation_key),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replay protection
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether an inbound message id was already processed by this session.
    pub fn has_seen(&self, message_id: &str) -> bool {
        self.recent_messages.iter().any(|id| id == message_id)
    }

    /// Remembers a processed message id, keeping at most `window` ids.
    pub fn remember_message(&mut self, message_id: impl Into<String>, window: usize) {
        self.recent_messages.push_back(message_id.into());
        while self.recent_messages.len() > window.max(1) {
            self.recent_messages.pop_front();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Moves to `step_id`, resetting all per-step bookkeeping.
    pub fn enter_step(&mut self, step_id: StepId) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.position = Position::enter(step_id, self.version);
        Ok(())
    }

    /// Records that the current flow definition changed under the session.
    pub fn adopt_flow_version(&mut self, flow_version: u32) {
        self.flow_version = flow_version;
    }

    /// Suspends the session until a callback with `key` arrives.
    pub fn await_callback(&mut self, key: CorrelationKey) -> Result<(), DomainError> {
        self.set_status(SessionStatus::WaitingExternal)?;
        self.position.suspension = Some(Suspension::AwaitingCallback {
            correlation_key: key,
        });
        Ok(())
    }

    /// Parks the session until a scheduled retry fires.
    pub fn schedule_retry(&mut self, attempt: u32, due_at: Timestamp) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.position.suspension = Some(Suspension::RetryScheduled { attempt, due_at });
        Ok(())
    }

    /// Clears any suspension and returns to `Active`.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.set_status(SessionStatus::Active)?;
        self.position.suspension = None;
        Ok(())
    }

    /// Closes the session after reaching a terminal step.
    pub fn complete(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.set_status(SessionStatus::Completed)?;
        self.position.suspension = None;
        self.closed_reason = Some(reason.into());
        Ok(())
    }

    /// Closes the session regardless of its current step.
    pub fn abandon(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.complete(format!("abandoned: {}", reason.into()))
    }

    /// Halts the session for human review.
    pub fn fail(&mut self, diagnostic: impl Into<String>) -> Result<(), DomainError> {
        self.set_status(SessionStatus::Errored)?;
        self.position.suspension = None;
        self.closed_reason = Some("errored".to_string());
        self.diagnostic = Some(diagnostic.into());
        Ok(())
    }

    /// Prepares the next committed version and returns the expected one.
    pub fn bump_version(&mut self, now: Timestamp) -> u64 {
        let expected = self.version;
        self.version += 1;
        self.updated_at = now;
        expected
    }

    fn set_status(&mut self, target: SessionStatus) -> Result<(), DomainError> {
        if self.status == target {
            return Ok(());
        }
        self.status = self.status.transition_to(target).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("session_id", self.id.to_string())
        })?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Session {} is closed ({})", self.id, self.status),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> StepId {
        StepId::new(id).unwrap()
    }

    fn new_session() -> Session {
        Session::start(
            ContactId::new("+15550100").unwrap(),
            FlowId::new("order").unwrap(),
            1,
            step("greet"),
            Timestamp::now(),
        )
    }

    #[test]
    fn start_creates_unpersisted_active_session() {
        let session = new_session();
        assert!(session.is_new());
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.current_step().as_str(), "greet");
        assert!(!session.position().effects_done);
    }

    #[test]
    fn enter_step_resets_bookkeeping() {
        let mut session = new_session();
        session.position_mut().reprompt_count = 2;
        session.position_mut().effects_done = true;
        session.bump_version(Timestamp::now());

        session.enter_step(step("ask")).unwrap();

        assert_eq!(session.current_step().as_str(), "ask");
        assert_eq!(session.position().reprompt_count, 0);
        assert_eq!(session.position().entered_version, 1);
        assert!(!session.position().effects_done);
    }

    #[test]
    fn await_callback_then_resume() {
        let mut session = new_session();
        let key = CorrelationKey::new("PAY-123").unwrap();

        session.await_callback(key.clone()).unwrap();
        assert_eq!(session.status(), SessionStatus::WaitingExternal);
        assert_eq!(session.awaiting_correlation(), Some(&key));

        session.resume().unwrap();
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.awaiting_correlation().is_none());
    }

    #[test]
    fn closed_session_rejects_mutation() {
        let mut session = new_session();
        session.complete("terminal").unwrap();

        assert!(!session.is_open());
        assert!(session.enter_step(step("ask")).is_err());
        assert!(session.resume().is_err());
        assert!(session.fail("late").is_err());
    }

    #[test]
    fn fail_records_diagnostic() {
        let mut session = new_session();
        session.fail("no branch matched at 'route'").unwrap();

        assert_eq!(session.status(), SessionStatus::Errored);
        assert_eq!(session.diagnostic(), Some("no branch matched at 'route'"));
    }

    #[test]
    fn abandon_prefixes_reason() {
        let mut session = new_session();
        session.abandon("idle_timeout").unwrap();
        assert_eq!(session.closed_reason(), Some("abandoned: idle_timeout"));
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[test]
    fn bump_version_returns_previous() {
        let mut session = new_session();
        assert_eq!(session.bump_version(Timestamp::now()), 0);
        assert_eq!(session.bump_version(Timestamp::now()), 1);
        assert_eq!(session.version(), 2);
    }

    #[test]
    fn message_window_is_bounded() {
        let mut session = new_session();
        for i in 0..5 {
            session.remember_message(format!("m-{}", i), 3);
        }
        assert!(!session.has_seen("m-0"));
        assert!(!session.has_seen("m-1"));
        assert!(session.has_seen("m-4"));
        assert_eq!(session.recent_messages().len(), 3);
    }
}
