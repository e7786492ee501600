//! Step interpreter - the session state machine.
//!
//! One call to [`Interpreter::run_turn`] feeds one event to a session and
//! follows automatic transitions until the session waits, suspends or
//! closes. The turn only mutates the in-memory session and collects staged
//! effects; the engine persists everything in a single commit afterwards.
//!
//! ## Per-step behaviour
//!
//! | Step     | On entry                  | On a later event                       |
//! |----------|---------------------------|----------------------------------------|
//! | Message  | emit text, auto-transition | re-evaluate transitions               |
//! | Input    | emit prompt, wait         | validate, transition or reprompt       |
//! | Action   | run the action            | resume on callback / retry on timeout  |
//! | Branch   | transition or halt        | -                                      |
//! | Terminal | emit optional text, close | -                                      |

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::action::ActionSpec;
use crate::domain::condition::Scope;
use crate::domain::flow::{render, FlowDefinition, FlowRegistry, InputExpectation, Step, StepKind};
use crate::domain::foundation::{InvocationId, StepId, Timestamp};
use crate::domain::job::Job;
use crate::domain::session::{Event, OutboundBody, Session, Suspension};
use crate::ports::CorrelationChange;

use super::action_executor::ActionExecutor;
use super::errors::EngineError;

#[derive(Debug, Clone)]
pub struct InterpreterSettings {
    /// Automatic transitions allowed in one turn.
    pub max_hops: u32,
    /// Reprompts allowed at input steps that don't declare their own limit.
    pub default_max_reprompts: u32,
    /// Sent to the contact when a session halts for review.
    pub fallback_message: String,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            max_hops: 25,
            default_max_reprompts: 2,
            fallback_message:
                "Sorry, something went wrong on our side. Someone from our team will follow up."
                    .to_string(),
        }
    }
}

/// Why an event left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// The event kind doesn't apply to the current step.
    Discarded,
    /// The event targets a step or suspension the session has already left.
    Stale,
    /// The awaited callback arrived but its payload matches no transition.
    Unmatched,
}

/// A job to enqueue once the turn is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub job: Job,
    pub run_at: Timestamp,
}

/// Effects of one turn, staged for the commit.
#[derive(Debug, Default)]
pub struct Turn {
    pub changed: bool,
    pub outbound: Vec<OutboundBody>,
    pub scheduled: Vec<ScheduledJob>,
    pub correlations: Vec<CorrelationChange>,
    /// Automatic transitions taken.
    pub hops: u32,
    pub ignored: Option<Ignored>,
}

impl Turn {
    fn emit(&mut self, text: String) {
        self.outbound.push(OutboundBody::text(text));
        self.changed = true;
    }
}

enum Next {
    Wait,
    Goto(StepId),
    Stop,
}

pub struct Interpreter {
    flows: Arc<FlowRegistry>,
    executor: Arc<ActionExecutor>,
    settings: InterpreterSettings,
}

impl Interpreter {
    pub fn new(
        flows: Arc<FlowRegistry>,
        executor: Arc<ActionExecutor>,
        settings: InterpreterSettings,
    ) -> Self {
        Self {
            flows,
            executor,
            settings,
        }
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    /// Feeds `event` to `session`.
    pub async fn run_turn(&self, session: &mut Session, event: &Event) -> Result<Turn, EngineError> {
        let mut turn = Turn::default();

        let flow = match self.flows.lookup(session.flow_id()) {
            Ok(flow) => flow,
            Err(_) => {
                let diagnostic = format!("flow '{}' is no longer registered", session.flow_id());
                self.halt(session, &mut turn, diagnostic)?;
                return Ok(turn);
            }
        };

        if flow.version != session.flow_version() {
            if !flow.contains(session.current_step()) {
                let diagnostic = format!(
                    "flow '{}' v{} has no step '{}' (session started on v{})",
                    flow.id,
                    flow.version,
                    session.current_step(),
                    session.flow_version()
                );
                self.halt(session, &mut turn, diagnostic)?;
                return Ok(turn);
            }
            warn!(
                session_id = %session.id(),
                flow_id = %flow.id,
                from_version = session.flow_version(),
                to_version = flow.version,
                step_id = %session.current_step(),
                "Flow definition changed; continuing on stored step"
            );
            session.adopt_flow_version(flow.version);
            turn.changed = true;
        }

        if let Some(ignored) = ignore_reason(session, event) {
            debug!(
                session_id = %session.id(),
                step_id = %session.current_step(),
                event = event.kind(),
                ?ignored,
                "Event does not apply to current step"
            );
            turn.ignored = Some(ignored);
            return Ok(turn);
        }

        let version = session.version();
        let mut fresh = true;
        loop {
            if !session.is_open() {
                break;
            }
            let step_id = session.current_step().clone();
            let Some(step) = flow.step(&step_id) else {
                let diagnostic = format!("step '{}' missing from flow '{}'", step_id, flow.id);
                self.halt(session, &mut turn, diagnostic)?;
                break;
            };

            let next = self
                .step(&flow, step, session, event, fresh, version, &mut turn)
                .await?;
            fresh = false;

            match next {
                Next::Wait | Next::Stop => break,
                Next::Goto(target) => {
                    if turn.hops >= self.settings.max_hops {
                        let err = EngineError::FlowAuthoringLoop {
                            flow_id: flow.id.to_string(),
                            step_id: step_id.to_string(),
                            limit: self.settings.max_hops,
                        };
                        self.halt(session, &mut turn, err.to_string())?;
                        break;
                    }
                    turn.hops += 1;
                    debug!(session_id = %session.id(), from = %step_id, to = %target, "Transition");
                    session.enter_step(target)?;
                    turn.changed = true;
                }
            }
        }

        Ok(turn)
    }

    #[allow(clippy::too_many_arguments)]
    async fn step(
        &self,
        flow: &FlowDefinition,
        step: &Step,
        session: &mut Session,
        event: &Event,
        fresh: bool,
        version: u64,
        turn: &mut Turn,
    ) -> Result<Next, EngineError> {
        match &step.kind {
            StepKind::Message { text } => {
                if !session.position().effects_done {
                    turn.emit(render(text, session.variables(), &step.id));
                    session.position_mut().effects_done = true;
                }
                self.advance_or_halt(flow, step, session, event, turn)
            }

            StepKind::Input {
                prompt,
                reprompt,
                expects,
                max_reprompts,
                fallback,
                save_as,
            } => {
                if !session.position().effects_done {
                    turn.emit(render(prompt, session.variables(), &step.id));
                    session.position_mut().effects_done = true;
                    return Ok(Next::Wait);
                }
                if !fresh {
                    return Ok(Next::Wait);
                }
                let input = InputStep {
                    prompt,
                    reprompt: reprompt.as_deref(),
                    expects,
                    max_reprompts: max_reprompts.unwrap_or(self.settings.default_max_reprompts),
                    fallback: fallback.as_ref(),
                    save_as: save_as.as_deref(),
                };
                self.input(step, &input, session, event, turn)
            }

            StepKind::Action { action, on_failure } => {
                match session.position().suspension.clone() {
                    Some(Suspension::AwaitingCallback { correlation_key }) => {
                        let (true, Event::ExternalCallback { payload, .. }) = (fresh, event) else {
                            return Ok(Next::Wait);
                        };
                        let mut resumed = session.clone();
                        resumed
                            .variables_mut()
                            .set_scoped(&step.id, "callback", payload.clone());
                        let Some(target) = self.pick(step, &resumed, event, None) else {
                            // Intermediate statuses leave the suspension and its key open.
                            info!(
                                session_id = %session.id(),
                                step_id = %step.id,
                                correlation_key = %correlation_key,
                                "Callback matched no transition; still waiting"
                            );
                            turn.ignored = Some(Ignored::Unmatched);
                            return Ok(Next::Wait);
                        };
                        *session = resumed;
                        session.resume()?;
                        turn.correlations
                            .push(CorrelationChange::Resolve(correlation_key.clone()));
                        turn.changed = true;
                        info!(
                            session_id = %session.id(),
                            step_id = %step.id,
                            correlation_key = %correlation_key,
                            "Session resumed by external callback"
                        );
                        Ok(Next::Goto(target))
                    }
                    Some(Suspension::RetryScheduled { .. }) => {
                        if !fresh {
                            return Ok(Next::Wait);
                        }
                        session.position_mut().suspension = None;
                        self.run_action(flow, step, action, on_failure.as_ref(), session, event, version, turn)
                            .await
                    }
                    None if !session.position().effects_done => {
                        self.run_action(flow, step, action, on_failure.as_ref(), session, event, version, turn)
                            .await
                    }
                    None => self.advance_or_halt(flow, step, session, event, turn),
                }
            }

            StepKind::Branch => self.advance_or_halt(flow, step, session, event, turn),

            StepKind::Terminal { text } => {
                if let Some(text) = text {
                    turn.emit(render(text, session.variables(), &step.id));
                }
                session.complete("terminal")?;
                turn.changed = true;
                info!(session_id = %session.id(), step_id = %step.id, "Session completed");
                Ok(Next::Stop)
            }
        }
    }

    fn input(
        &self,
        step: &Step,
        input: &InputStep<'_>,
        session: &mut Session,
        event: &Event,
        turn: &mut Turn,
    ) -> Result<Next, EngineError> {
        let Some(message) = event.as_inbound() else {
            turn.ignored = Some(Ignored::Discarded);
            return Ok(Next::Wait);
        };

        let reason = match input.expects.accept(message.text()) {
            Ok(value) => {
                let vars = session.variables_mut();
                vars.set_scoped(&step.id, "input", value.clone());
                if let Some(name) = input.save_as {
                    vars.set_global(name, value.clone());
                }
                turn.changed = true;
                if let Some(target) = self.pick(step, session, event, Some(&value)) {
                    return Ok(Next::Goto(target));
                }
                "no transition accepts the input".to_string()
            }
            Err(mismatch) => mismatch.to_string(),
        };

        let position = session.position_mut();
        if position.reprompt_count < input.max_reprompts {
            position.reprompt_count += 1;
            let count = position.reprompt_count;
            debug!(
                session_id = %session.id(),
                step_id = %step.id,
                reprompt_count = count,
                reason = %reason,
                "Input mismatch; reprompting"
            );
        } else if let Some(fallback) = input.fallback {
            info!(
                session_id = %session.id(),
                step_id = %step.id,
                fallback = %fallback,
                "Reprompts exhausted; taking fallback"
            );
            return Ok(Next::Goto(fallback.clone()));
        }

        let text = input.reprompt.unwrap_or(input.prompt);
        turn.emit(render(text, session.variables(), &step.id));
        Ok(Next::Wait)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_action(
        &self,
        flow: &FlowDefinition,
        step: &Step,
        spec: &ActionSpec,
        on_failure: Option<&StepId>,
        session: &mut Session,
        event: &Event,
        version: u64,
        turn: &mut Turn,
    ) -> Result<Next, EngineError> {
        let attempt = session.position().action_attempts + 1;
        {
            let position = session.position_mut();
            position.action_attempts = attempt;
            position.effects_done = true;
        }
        turn.changed = true;

        let invocation_id = InvocationId::derive(session.id(), &step.id, version, turn.hops);
        let policy = self.executor.retry_policy(spec);

        match self
            .executor
            .execute(spec, session, &invocation_id, attempt)
            .await
        {
            Ok(result) => {
                {
                    let vars = session.variables_mut();
                    vars.merge_outputs(&step.id, &result.outputs);
                    vars.set_scoped(&step.id, "success", result.success);
                }
                turn.outbound.extend(result.outbound.iter().cloned());

                if !result.success {
                    let reason = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "action reported failure".to_string());
                    session
                        .variables_mut()
                        .set_scoped(&step.id, "error", reason.clone());
                    return self.action_failed(flow, step, on_failure, session, reason, turn);
                }

                if let Some(key) = result.pending {
                    session.await_callback(key.clone())?;
                    turn.correlations.push(CorrelationChange::Register(key.clone()));
                    info!(
                        session_id = %session.id(),
                        step_id = %step.id,
                        correlation_key = %key,
                        "Session waiting for external callback"
                    );
                    return Ok(Next::Wait);
                }

                self.advance_or_halt(flow, step, session, event, turn)
            }
            Err(err) if err.is_retryable() && policy.allows_retry_after(attempt) => {
                let delay = policy.delay_after(attempt);
                let run_at = Timestamp::now().plus(delay);
                session.schedule_retry(attempt, run_at)?;
                turn.scheduled.push(ScheduledJob {
                    job: Job::process_event(
                        session.contact_id().clone(),
                        Event::Timeout {
                            session_id: *session.id(),
                            step_id: step.id.clone(),
                            attempt,
                        },
                    ),
                    run_at,
                });
                info!(
                    session_id = %session.id(),
                    step_id = %step.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Action retry scheduled"
                );
                Ok(Next::Wait)
            }
            Err(err) => {
                if err.is_retryable() {
                    error!(
                        alert = true,
                        session_id = %session.id(),
                        step_id = %step.id,
                        attempts = attempt,
                        error = %err,
                        "Action retries exhausted"
                    );
                }
                {
                    let vars = session.variables_mut();
                    vars.set_scoped(&step.id, "success", false);
                    vars.set_scoped(&step.id, "error", err.to_string());
                }
                self.action_failed(flow, step, on_failure, session, err.to_string(), turn)
            }
        }
    }

    fn action_failed(
        &self,
        flow: &FlowDefinition,
        step: &Step,
        on_failure: Option<&StepId>,
        session: &mut Session,
        reason: String,
        turn: &mut Turn,
    ) -> Result<Next, EngineError> {
        if let Some(target) = on_failure {
            warn!(
                session_id = %session.id(),
                step_id = %step.id,
                on_failure = %target,
                reason = %reason,
                "Action failed; following on_failure"
            );
            return Ok(Next::Goto(target.clone()));
        }
        let diagnostic = format!(
            "action '{}' at step '{}' in flow '{}' failed: {}",
            match &step.kind {
                StepKind::Action { action, .. } => action.action_type().as_str(),
                other => other.name(),
            },
            step.id,
            flow.id,
            reason
        );
        self.halt(session, turn, diagnostic)?;
        Ok(Next::Stop)
    }

    /// Moves the session to `errored` and tells the contact.
    fn halt(
        &self,
        session: &mut Session,
        turn: &mut Turn,
        diagnostic: String,
    ) -> Result<(), EngineError> {
        error!(
            alert = true,
            session_id = %session.id(),
            contact_id = %session.contact_id(),
            flow_id = %session.flow_id(),
            step_id = %session.current_step(),
            diagnostic = %diagnostic,
            "Session halted for review"
        );
        if let Some(key) = session.awaiting_correlation().cloned() {
            turn.correlations.push(CorrelationChange::Resolve(key));
        }
        session.fail(diagnostic)?;
        turn.emit(self.settings.fallback_message.clone());
        Ok(())
    }

    /// Takes the first matching transition of a step that never waits for
    /// input; with none matching the session would be parked for good.
    fn advance_or_halt(
        &self,
        flow: &FlowDefinition,
        step: &Step,
        session: &mut Session,
        event: &Event,
        turn: &mut Turn,
    ) -> Result<Next, EngineError> {
        if let Some(target) = self.pick(step, session, event, None) {
            return Ok(Next::Goto(target));
        }
        let diagnostic = format!(
            "{} step '{}' in flow '{}' has no matching transition",
            step.kind.name(),
            step.id,
            flow.id
        );
        self.halt(session, turn, diagnostic)?;
        Ok(Next::Stop)
    }

    /// First transition, in priority order, whose predicate holds.
    fn pick(
        &self,
        step: &Step,
        session: &Session,
        event: &Event,
        input: Option<&Value>,
    ) -> Option<StepId> {
        let scope = Scope {
            step_id: &step.id,
            variables: session.variables(),
            event: Some(event),
            input,
        };
        step.ordered_transitions()
            .into_iter()
            .find(|t| t.when.evaluate(&scope))
            .map(|t| t.to.clone())
    }
}

struct InputStep<'a> {
    prompt: &'a str,
    reprompt: Option<&'a str>,
    expects: &'a InputExpectation,
    max_reprompts: u32,
    fallback: Option<&'a StepId>,
    save_as: Option<&'a str>,
}

/// Re-validates that `event` still applies to the session's position.
fn ignore_reason(session: &Session, event: &Event) -> Option<Ignored> {
    let suspension = session.position().suspension.as_ref();
    match (event, suspension) {
        (Event::InboundMessage(_), None) => None,
        (Event::InboundMessage(_), Some(_)) => Some(Ignored::Discarded),
        (
            Event::ExternalCallback {
                correlation_key, ..
            },
            Some(Suspension::AwaitingCallback {
                correlation_key: waiting,
            }),
        ) if correlation_key == waiting => None,
        (Event::ExternalCallback { .. }, _) => Some(Ignored::Stale),
        (
            Event::Timeout {
                session_id,
                step_id,
                attempt,
            },
            Some(Suspension::RetryScheduled { attempt: due, .. }),
        ) if session_id == session.id()
            && step_id == session.current_step()
            && attempt == due =>
        {
            None
        }
        (Event::Timeout { .. }, _) => Some(Ignored::Stale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::actions::SendMessageAction;
    use crate::adapters::memory::InMemoryInvocationLog;
    use crate::application::action_registry::ActionRegistry;
    use crate::domain::foundation::{ContactId, CorrelationKey, SessionStatus};
    use crate::domain::session::InboundMessage;
    use serde_json::json;

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    const SURVEY: &str = r#"
id: survey
entry: hello
steps:
  - id: hello
    type: message
    text: "Hi {{name}}!"
    transitions:
      - to: ask
  - id: ask
    type: input
    prompt: "Continue? (yes/no)"
    reprompt: "Please answer yes or no."
    expects: { kind: choices, options: ["yes", "no"] }
    max_reprompts: 1
    fallback: bye
    save_as: answer
    transitions:
      - to: route
  - id: route
    type: branch
    transitions:
      - to: done
        when: { equals: { var: answer, value: "yes" } }
      - to: bye
        when: { equals: { var: answer, value: "no" } }
  - id: done
    type: terminal
    text: "Great!"
  - id: bye
    type: terminal
    text: "Bye."
"#;

    const LOOP: &str = r#"
id: loop
entry: a
steps:
  - id: a
    type: branch
    transitions:
      - to: b
  - id: b
    type: branch
    transitions:
      - to: a
"#;

    const AWAIT: &str = r#"
id: await
entry: notify
steps:
  - id: notify
    type: action
    action: { type: send_message, text: "Working on it." }
    transitions:
      - to: done
        when: { equals: { var: event.status, value: ready } }
  - id: done
    type: terminal
    text: "Ready."
"#;

    const DEAD_END: &str = r#"
id: dead_end
entry: note
steps:
  - id: note
    type: message
    text: "Checking your account."
    transitions:
      - to: vip
        when: { equals: { var: tier, value: gold } }
  - id: vip
    type: terminal
"#;

    fn interpreter(sources: &[&str]) -> Interpreter {
        let definitions = sources
            .iter()
            .map(|s| FlowRegistry::parse_yaml(s).unwrap())
            .collect();
        let flows = Arc::new(FlowRegistry::from_definitions(definitions, None).unwrap());
        let executor = Arc::new(ActionExecutor::new(
            ActionRegistry::new().with(Arc::new(SendMessageAction::new())),
            Arc::new(InMemoryInvocationLog::new()),
        ));
        Interpreter::new(flows, executor, InterpreterSettings::default())
    }

    fn start(interpreter: &Interpreter, flow: &str) -> Session {
        let flow = interpreter
            .flows()
            .lookup(&crate::domain::foundation::FlowId::new(flow).unwrap())
            .unwrap();
        Session::start(
            ContactId::new("+15550100").unwrap(),
            flow.id.clone(),
            flow.version,
            flow.entry.clone(),
            Timestamp::now(),
        )
    }

    fn text(body: &str) -> Event {
        Event::InboundMessage(InboundMessage {
            message_id: format!("m-{}", body),
            channel: "test".into(),
            payload: json!({ "text": body }),
            received_at: Timestamp::now(),
        })
    }

    fn texts(turn: &Turn) -> Vec<String> {
        turn.outbound.iter().map(|b| b.to_plain_text()).collect()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn message_auto_transitions_into_input_prompt() {
        let interpreter = interpreter(&[SURVEY]);
        let mut session = start(&interpreter, "survey");
        session.variables_mut().set_global("name", "Ada");

        let turn = interpreter.run_turn(&mut session, &text("hi")).await.unwrap();

        assert_eq!(texts(&turn), vec!["Hi Ada!", "Continue? (yes/no)"]);
        assert_eq!(session.current_step().as_str(), "ask");
        assert_eq!(turn.hops, 1);
    }

    #[tokio::test]
    async fn valid_input_flows_through_branch_to_terminal() {
        let interpreter = interpreter(&[SURVEY]);
        let mut session = start(&interpreter, "survey");
        interpreter.run_turn(&mut session, &text("hi")).await.unwrap();

        let turn = interpreter.run_turn(&mut session, &text(" YES ")).await.unwrap();

        assert_eq!(texts(&turn), vec!["Great!"]);
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.variables().get("answer"), Some(&json!("yes")));
    }

    #[tokio::test]
    async fn mismatch_reprompts_then_takes_fallback() {
        let interpreter = interpreter(&[SURVEY]);
        let mut session = start(&interpreter, "survey");
        interpreter.run_turn(&mut session, &text("hi")).await.unwrap();

        let turn = interpreter.run_turn(&mut session, &text("maybe")).await.unwrap();
        assert_eq!(texts(&turn), vec!["Please answer yes or no."]);
        assert_eq!(session.position().reprompt_count, 1);
        assert_eq!(session.current_step().as_str(), "ask");

        let turn = interpreter.run_turn(&mut session, &text("perhaps")).await.unwrap();
        assert_eq!(texts(&turn), vec!["Bye."]);
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn transition_cycle_hits_loop_cap() {
        let interpreter = interpreter(&[LOOP]);
        let mut session = start(&interpreter, "loop");

        let turn = interpreter.run_turn(&mut session, &text("go")).await.unwrap();

        assert_eq!(session.status(), SessionStatus::Errored);
        assert_eq!(turn.hops, 25);
        assert!(session.diagnostic().unwrap().contains("exceeded 25"));
        assert_eq!(
            texts(&turn),
            vec![InterpreterSettings::default().fallback_message]
        );
    }

    #[tokio::test]
    async fn unrelated_callback_is_stale() {
        let interpreter = interpreter(&[SURVEY]);
        let mut session = start(&interpreter, "survey");
        interpreter.run_turn(&mut session, &text("hi")).await.unwrap();

        let callback = Event::ExternalCallback {
            correlation_key: CorrelationKey::new("PAY-1").unwrap(),
            payload: json!({}),
        };
        let turn = interpreter.run_turn(&mut session, &callback).await.unwrap();

        assert!(!turn.changed);
        assert_eq!(turn.ignored, Some(Ignored::Stale));
    }

    fn awaiting(interpreter: &Interpreter, key: &str) -> Session {
        let mut session = start(interpreter, "await");
        session.position_mut().effects_done = true;
        session
            .await_callback(CorrelationKey::new(key).unwrap())
            .unwrap();
        session
    }

    fn callback(key: &str, status: &str) -> Event {
        Event::ExternalCallback {
            correlation_key: CorrelationKey::new(key).unwrap(),
            payload: json!({ "status": status }),
        }
    }

    #[tokio::test]
    async fn callback_matching_no_transition_keeps_the_suspension() {
        let interpreter = interpreter(&[AWAIT]);
        let mut session = awaiting(&interpreter, "JOB-1");
        let before = session.clone();

        let turn = interpreter
            .run_turn(&mut session, &callback("JOB-1", "processing"))
            .await
            .unwrap();

        assert!(!turn.changed);
        assert_eq!(turn.ignored, Some(Ignored::Unmatched));
        assert!(turn.correlations.is_empty());
        assert_eq!(session, before);
        assert_eq!(session.status(), SessionStatus::WaitingExternal);
        assert_eq!(
            session.awaiting_correlation().map(|k| k.as_str()),
            Some("JOB-1")
        );

        let turn = interpreter
            .run_turn(&mut session, &callback("JOB-1", "ready"))
            .await
            .unwrap();

        assert_eq!(texts(&turn), vec!["Ready."]);
        assert_eq!(session.status(), SessionStatus::Completed);
        assert!(matches!(
            turn.correlations.as_slice(),
            [CorrelationChange::Resolve(key)] if key.as_str() == "JOB-1"
        ));
        assert_eq!(
            session.variables().get("notify.callback"),
            Some(&json!({ "status": "ready" }))
        );
    }

    #[tokio::test]
    async fn message_step_without_matching_transition_halts() {
        let interpreter = interpreter(&[DEAD_END]);
        let mut session = start(&interpreter, "dead_end");

        let turn = interpreter.run_turn(&mut session, &text("hi")).await.unwrap();

        assert_eq!(session.status(), SessionStatus::Errored);
        assert!(session
            .diagnostic()
            .unwrap()
            .contains("message step 'note' in flow 'dead_end' has no matching transition"));
        assert_eq!(
            texts(&turn),
            vec![
                "Checking your account.".to_string(),
                InterpreterSettings::default().fallback_message
            ]
        );
    }

    #[tokio::test]
    async fn flow_version_drift_errors_when_step_is_gone() {
        let interpreter = interpreter(&[SURVEY]);
        let session = start(&interpreter, "survey");
        let mut drifted = Session::reconstitute(
            *session.id(),
            session.contact_id().clone(),
            session.flow_id().clone(),
            0,
            SessionStatus::Active,
            crate::domain::session::Position {
                step_id: StepId::new("removed").unwrap(),
                entered_version: 0,
                effects_done: true,
                reprompt_count: 0,
                action_attempts: 0,
                suspension: None,
            },
            Default::default(),
            Default::default(),
            None,
            None,
            3,
            Timestamp::now(),
            Timestamp::now(),
        );

        let turn = interpreter.run_turn(&mut drifted, &text("hi")).await.unwrap();

        assert!(turn.changed);
        assert_eq!(drifted.status(), SessionStatus::Errored);
        assert!(drifted.diagnostic().unwrap().contains("no step 'removed'"));
    }

    #[tokio::test]
    async fn flow_version_drift_continues_when_step_exists() {
        let interpreter = interpreter(&[SURVEY]);
        let session = start(&interpreter, "survey");
        let mut drifted = Session::reconstitute(
            *session.id(),
            session.contact_id().clone(),
            session.flow_id().clone(),
            0,
            SessionStatus::Active,
            crate::domain::session::Position {
                step_id: StepId::new("ask").unwrap(),
                entered_version: 0,
                effects_done: true,
                reprompt_count: 0,
                action_attempts: 0,
                suspension: None,
            },
            Default::default(),
            Default::default(),
            None,
            None,
            3,
            Timestamp::now(),
            Timestamp::now(),
        );

        interpreter.run_turn(&mut drifted, &text("no")).await.unwrap();

        assert_eq!(drifted.flow_version(), 1);
        assert_eq!(drifted.status(), SessionStatus::Completed);
    }
}
