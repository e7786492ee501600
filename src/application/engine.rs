//! FlowEngine - the entry point for everything that can advance a session.
//!
//! A turn runs under the contact's lease: load the open session (or start
//! one), feed the event to the interpreter, then commit the new version
//! together with its outbox entries and correlation changes in a single
//! optimistic write. A version conflict reloads and re-runs the turn; the
//! deterministic invocation ids make the re-run replay any action results
//! the lost attempt already recorded.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::flow::FlowRegistry;
use crate::domain::foundation::{
    ContactId, CorrelationKey, InvocationId, SessionId, SessionStatus, StepId, Timestamp,
};
use crate::domain::job::Job;
use crate::domain::session::{Event, InboundMessage, Session};
use crate::ports::{
    CorrelationChange, OutboxEffect, OutboxEntry, SessionCommit, SessionRepository, TaskQueue,
};

use super::concurrency_guard::{ConcurrencyGuard, GuardError};
use super::correlator::{Correlation, ExternalEventCorrelator};
use super::errors::EngineError;
use super::interpreter::{Ignored, Interpreter, Turn};
use super::outbox_relay::OutboxRelay;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Re-runs of a turn after a version conflict before giving up.
    pub conflict_retries: u32,
    /// Inbound message ids remembered per session for replay detection.
    pub seen_window: usize,
    /// First delay when requeueing an event after a lock timeout.
    pub requeue_base: Duration,
    pub requeue_max: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            seen_window: 32,
            requeue_base: Duration::from_millis(200),
            requeue_max: Duration::from_secs(10),
        }
    }
}

impl EngineSettings {
    /// Backoff before the `attempt`-th requeue, doubling up to `requeue_max`.
    pub fn requeue_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.requeue_base
            .saturating_mul(factor)
            .min(self.requeue_max)
    }
}

/// Why an event left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// The inbound message id was already processed.
    Duplicate,
    /// The event targets a suspension the session is no longer in.
    Stale,
    /// The current step does not take this kind of event.
    Discarded,
    /// No open session exists for the event.
    NotFound,
    /// The callback's correlation key was already consumed.
    AlreadyResolved,
    /// The callback matched no transition; the session keeps waiting on its key.
    Unmatched,
    /// No flow is triggered by the message and no default flow is set.
    NoFlow,
}

/// Outcome of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Advanced {
        session_id: SessionId,
        version: u64,
        status: SessionStatus,
        step_id: StepId,
    },
    Unchanged(UnchangedReason),
    /// The contact was busy; the event went back on the queue.
    Requeued { attempt: u32, delay: Duration },
}

impl Disposition {
    pub fn is_advanced(&self) -> bool {
        matches!(self, Disposition::Advanced { .. })
    }
}

impl From<Ignored> for UnchangedReason {
    fn from(ignored: Ignored) -> Self {
        match ignored {
            Ignored::Discarded => UnchangedReason::Discarded,
            Ignored::Stale => UnchangedReason::Stale,
            Ignored::Unmatched => UnchangedReason::Unmatched,
        }
    }
}

pub struct FlowEngine {
    sessions: Arc<dyn SessionRepository>,
    guard: Arc<ConcurrencyGuard>,
    interpreter: Arc<Interpreter>,
    correlator: ExternalEventCorrelator,
    queue: Arc<dyn TaskQueue>,
    relay: Option<Arc<OutboxRelay>>,
    settings: EngineSettings,
}

impl FlowEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        guard: Arc<ConcurrencyGuard>,
        interpreter: Arc<Interpreter>,
        queue: Arc<dyn TaskQueue>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            correlator: ExternalEventCorrelator::new(sessions.clone()),
            sessions,
            guard,
            interpreter,
            queue,
            relay: None,
            settings,
        }
    }

    /// Delivers committed outbox entries inline right after each commit.
    pub fn with_relay(mut self, relay: Arc<OutboxRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn flows(&self) -> &FlowRegistry {
        self.interpreter.flows()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ════════════════════════════════════════════════════════════════════════
    // Entry points
    // ════════════════════════════════════════════════════════════════════════

    pub async fn handle_inbound_event(
        &self,
        contact_id: &ContactId,
        message: InboundMessage,
    ) -> Result<Disposition, EngineError> {
        self.process(contact_id, Event::InboundMessage(message), 0)
            .await
    }

    pub async fn handle_external_callback(
        &self,
        correlation_key: &CorrelationKey,
        payload: Value,
    ) -> Result<Disposition, EngineError> {
        self.handle_external_callback_attempt(correlation_key, payload, 0)
            .await
    }

    pub(crate) async fn handle_external_callback_attempt(
        &self,
        correlation_key: &CorrelationKey,
        payload: Value,
        attempt: u32,
    ) -> Result<Disposition, EngineError> {
        let record = match self.correlator.resolve(correlation_key).await? {
            Correlation::Pending(record) => record,
            Correlation::AlreadyResolved(_) => {
                return Ok(Disposition::Unchanged(UnchangedReason::AlreadyResolved))
            }
            Correlation::NotFound => return Ok(Disposition::Unchanged(UnchangedReason::NotFound)),
        };
        let event = Event::ExternalCallback {
            correlation_key: correlation_key.clone(),
            payload,
        };
        self.process(&record.contact_id, event, attempt).await
    }

    /// Runs one turn for `contact_id`. `attempt` counts earlier lock-timeout
    /// requeues of the same event.
    pub async fn process(
        &self,
        contact_id: &ContactId,
        event: Event,
        attempt: u32,
    ) -> Result<Disposition, EngineError> {
        let lease = match self.guard.acquire(contact_id).await {
            Ok(lease) => lease,
            Err(GuardError::LockTimeout { waited_ms, .. }) => {
                return self.requeue(contact_id, event, attempt, waited_ms).await;
            }
            Err(GuardError::Store(e)) => return Err(EngineError::Storage(e)),
        };

        let outcome = self.run_locked(contact_id, &event).await;
        lease.release().await;

        let (disposition, entries) = outcome?;
        self.relay_inline(entries).await;
        Ok(disposition)
    }

    /// Closes the contact's open session, if any.
    pub async fn abandon(
        &self,
        contact_id: &ContactId,
        reason: &str,
    ) -> Result<Disposition, EngineError> {
        let lease = self.guard.acquire(contact_id).await.map_err(|e| match e {
            GuardError::LockTimeout { contact_id, .. } => EngineError::LockTimeout { contact_id },
            GuardError::Store(e) => EngineError::Storage(e),
        })?;
        let outcome = self.abandon_locked(contact_id, reason).await;
        lease.release().await;
        outcome
    }

    // ════════════════════════════════════════════════════════════════════════
    // Turn execution (lease held)
    // ════════════════════════════════════════════════════════════════════════

    async fn run_locked(
        &self,
        contact_id: &ContactId,
        event: &Event,
    ) -> Result<(Disposition, Vec<OutboxEntry>), EngineError> {
        let mut conflicts = 0;
        loop {
            match self.run_turn_once(contact_id, event).await {
                Err(e) if e.is_conflict() && conflicts < self.settings.conflict_retries => {
                    conflicts += 1;
                    warn!(
                        contact_id = %contact_id,
                        event = event.kind(),
                        conflicts,
                        "Version conflict; re-running turn"
                    );
                }
                Err(e) if e.is_conflict() => {
                    error!(
                        alert = true,
                        contact_id = %contact_id,
                        event = event.kind(),
                        "Turn kept conflicting; giving up"
                    );
                    return Err(e);
                }
                Err(e @ EngineError::CorrelationTaken(_)) => {
                    error!(
                        alert = true,
                        contact_id = %contact_id,
                        event = event.kind(),
                        error = %e,
                        "Turn waits on a correlation key owned by another session; rejected"
                    );
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    async fn run_turn_once(
        &self,
        contact_id: &ContactId,
        event: &Event,
    ) -> Result<(Disposition, Vec<OutboxEntry>), EngineError> {
        let inbound = event.as_inbound();

        if let Some(message) = inbound {
            let latest = self.sessions.find_latest_by_contact(contact_id).await?;
            if latest.is_some_and(|s| s.has_seen(&message.message_id)) {
                info!(
                    contact_id = %contact_id,
                    message_id = %message.message_id,
                    "Duplicate inbound message; ignoring"
                );
                return Ok(unchanged(UnchangedReason::Duplicate));
            }
        }

        let mut session = match self.sessions.find_open_by_contact(contact_id).await? {
            Some(session) => session,
            None => match inbound {
                Some(message) => match self.interpreter.flows().select_for(message.text()) {
                    Some(flow) => {
                        info!(contact_id = %contact_id, flow_id = %flow.id, "Starting session");
                        Session::start(
                            contact_id.clone(),
                            flow.id.clone(),
                            flow.version,
                            flow.entry.clone(),
                            Timestamp::now(),
                        )
                    }
                    None => {
                        debug!(contact_id = %contact_id, "No flow matches inbound message");
                        return Ok(unchanged(UnchangedReason::NoFlow));
                    }
                },
                None => {
                    warn!(
                        contact_id = %contact_id,
                        event = event.kind(),
                        "No open session for event"
                    );
                    return Ok(unchanged(UnchangedReason::NotFound));
                }
            },
        };

        let version_at_start = session.version();
        let turn = self.interpreter.run_turn(&mut session, event).await?;

        if !turn.changed && !session.is_new() {
            let reason = turn
                .ignored
                .map(UnchangedReason::from)
                .unwrap_or(UnchangedReason::Discarded);
            return Ok(unchanged(reason));
        }

        if let Some(message) = inbound {
            session.remember_message(message.message_id.clone(), self.settings.seen_window);
        }
        let expected_version = session.bump_version(Timestamp::now());
        let outbox = outbox_entries(&session, version_at_start, &turn);

        let disposition = Disposition::Advanced {
            session_id: *session.id(),
            version: session.version(),
            status: session.status(),
            step_id: session.current_step().clone(),
        };
        info!(
            session_id = %session.id(),
            contact_id = %contact_id,
            event = event.kind(),
            version = session.version(),
            status = %session.status(),
            step_id = %session.current_step(),
            hops = turn.hops,
            outbound = turn.outbound.len(),
            "Turn committed"
        );

        self.sessions
            .commit(SessionCommit {
                session,
                expected_version,
                outbox: outbox.clone(),
                correlations: turn.correlations,
            })
            .await?;

        Ok((disposition, outbox))
    }

    async fn abandon_locked(
        &self,
        contact_id: &ContactId,
        reason: &str,
    ) -> Result<Disposition, EngineError> {
        let mut conflicts = 0;
        loop {
            let Some(mut session) = self.sessions.find_open_by_contact(contact_id).await? else {
                return Ok(Disposition::Unchanged(UnchangedReason::NotFound));
            };
            let correlations = session
                .awaiting_correlation()
                .cloned()
                .map(CorrelationChange::Resolve)
                .into_iter()
                .collect();
            session.abandon(reason)?;
            let expected_version = session.bump_version(Timestamp::now());
            let disposition = Disposition::Advanced {
                session_id: *session.id(),
                version: session.version(),
                status: session.status(),
                step_id: session.current_step().clone(),
            };

            let result = self
                .sessions
                .commit(SessionCommit {
                    session,
                    expected_version,
                    outbox: vec![],
                    correlations,
                })
                .await;
            match result {
                Ok(()) => {
                    info!(contact_id = %contact_id, reason, "Session abandoned");
                    return Ok(disposition);
                }
                Err(e) if e.is_conflict() && conflicts < self.settings.conflict_retries => {
                    conflicts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Helpers
    // ════════════════════════════════════════════════════════════════════════

    async fn requeue(
        &self,
        contact_id: &ContactId,
        event: Event,
        attempt: u32,
        waited_ms: u64,
    ) -> Result<Disposition, EngineError> {
        let attempt = attempt + 1;
        let delay = self.settings.requeue_delay(attempt);
        let job = Job::process_event(contact_id.clone(), event).with_attempt(attempt);
        self.queue.schedule(delay, job).await?;
        warn!(
            contact_id = %contact_id,
            waited_ms,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "{}; requeued",
            EngineError::LockTimeout {
                contact_id: contact_id.clone()
            }
        );
        Ok(Disposition::Requeued { attempt, delay })
    }

    async fn relay_inline(&self, entries: Vec<OutboxEntry>) {
        let Some(relay) = &self.relay else {
            return;
        };
        if entries.is_empty() {
            return;
        }
        if let Err(e) = relay.deliver(entries).await {
            warn!(error = %e, "Inline outbox delivery failed; relay loop will retry");
        }
    }
}

fn unchanged(reason: UnchangedReason) -> (Disposition, Vec<OutboxEntry>) {
    (Disposition::Unchanged(reason), Vec::new())
}

/// Outbox entries of a turn, with ids derived from the session and the
/// version the turn started from, so a re-run produces the same ids.
fn outbox_entries(session: &Session, version_at_start: u64, turn: &Turn) -> Vec<OutboxEntry> {
    let session_id = session.id().to_string();
    let version = version_at_start.to_string();
    let base = InvocationId::from_parts(&[&session_id, &version, "outbox"]);

    let messages = turn.outbound.iter().map(|body| OutboxEffect::Deliver {
        body: body.clone(),
    });
    let jobs = turn.scheduled.iter().map(|scheduled| OutboxEffect::Schedule {
        job: scheduled.job.clone(),
        run_at: scheduled.run_at,
    });

    messages
        .chain(jobs)
        .enumerate()
        .map(|(i, effect)| {
            OutboxEntry::new(
                base.child(i),
                *session.id(),
                session.contact_id().clone(),
                effect,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_delay_doubles_and_caps() {
        let settings = EngineSettings {
            requeue_base: Duration::from_millis(100),
            requeue_max: Duration::from_millis(500),
            ..Default::default()
        };

        assert_eq!(settings.requeue_delay(1), Duration::from_millis(100));
        assert_eq!(settings.requeue_delay(2), Duration::from_millis(200));
        assert_eq!(settings.requeue_delay(3), Duration::from_millis(400));
        assert_eq!(settings.requeue_delay(4), Duration::from_millis(500));
        assert_eq!(settings.requeue_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn ignored_maps_to_unchanged_reason() {
        assert_eq!(UnchangedReason::from(Ignored::Stale), UnchangedReason::Stale);
        assert_eq!(
            UnchangedReason::from(Ignored::Discarded),
            UnchangedReason::Discarded
        );
        assert_eq!(
            UnchangedReason::from(Ignored::Unmatched),
            UnchangedReason::Unmatched
        );
    }
}
