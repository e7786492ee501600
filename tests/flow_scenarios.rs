//! End-to-end conversation scenarios against the bundled flows.
//!
//! Every test wires the real engine, interpreter, executor and outbox relay
//! on top of the in-memory adapters (see `common`).

mod common;

use std::time::Duration;

use serde_json::json;

use common::{contact, key, Harness, HarnessBuilder};
use convoflow::application::{
    Disposition, EngineError, IdleSweeper, IdleSweeperConfig, InterpreterSettings,
    UnchangedReason,
};
use convoflow::domain::foundation::{SessionStatus, StepId, Timestamp};
use convoflow::domain::session::Event;
use convoflow::adapters::memory::MockPaymentGateway;
use convoflow::ports::GatewayError;

fn step(id: &str) -> StepId {
    StepId::new(id).unwrap()
}

fn assert_advanced_to(disposition: &Disposition, status: SessionStatus, step_id: &str) {
    match disposition {
        Disposition::Advanced {
            status: actual,
            step_id: actual_step,
            ..
        } => {
            assert_eq!(*actual, status);
            assert_eq!(actual_step.as_str(), step_id);
        }
        other => panic!("expected the session to advance, got {:?}", other),
    }
}

/// Walks a contact through the order flow up to the payment suspension.
async fn order_until_payment(h: &Harness, who: &str) {
    let c = contact(who);
    h.say(&c, "o-1", "order").await.unwrap();
    h.say(&c, "o-2", "tea-green").await.unwrap();
    let disposition = h.say(&c, "o-3", "2").await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::WaitingExternal, "pay");
}

// ════════════════════════════════════════════════════════════════════════════
// Input steps
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn trigger_starts_flow_and_prompts_first_input() {
    let h = HarnessBuilder::bundled().build();
    let c = contact("+15550001");

    let disposition = h.say(&c, "m-1", "Survey").await.unwrap();

    assert_advanced_to(&disposition, SessionStatus::Active, "satisfied");
    assert_eq!(
        h.texts(&c),
        vec![
            "Thanks for taking our quick survey.".to_string(),
            "Were you happy with your last order? (yes/no)".to_string(),
        ]
    );
    assert_eq!(h.latest(&c).await.version(), 1);
}

#[tokio::test]
async fn invalid_answer_reprompts_then_valid_answer_advances() {
    let h = HarnessBuilder::bundled().build();
    let c = contact("+15550002");
    h.say(&c, "m-1", "survey").await.unwrap();

    let disposition = h.say(&c, "m-2", "maybe").await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::Active, "satisfied");
    assert_eq!(h.last_text(&c), "Please answer yes or no.");
    assert_eq!(h.latest(&c).await.position().reprompt_count, 1);

    let disposition = h.say(&c, "m-3", "  YES ").await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::Active, "rating");
    assert_eq!(h.last_text(&c), "Great! How would you rate us from 1 to 5?");

    let disposition = h.say(&c, "m-4", "4").await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::Completed, "thanks");
    assert_eq!(h.last_text(&c), "Thank you, your feedback has been recorded.");

    let session = h.latest(&c).await;
    let at = step("thanks");
    assert_eq!(session.variables().resolve("satisfied", &at), Some(&json!("yes")));
    assert_eq!(session.variables().resolve("rating", &at), Some(&json!(4)));
    assert_eq!(session.version(), 4);
}

#[tokio::test]
async fn exhausted_reprompts_take_the_fallback() {
    let h = HarnessBuilder::bundled().build();
    let c = contact("+15550003");
    h.say(&c, "m-1", "survey").await.unwrap();

    h.say(&c, "m-2", "maybe").await.unwrap();
    h.say(&c, "m-3", "perhaps").await.unwrap();
    let disposition = h.say(&c, "m-4", "dunno").await.unwrap();

    assert_advanced_to(&disposition, SessionStatus::Completed, "gave_up");
    assert_eq!(h.last_text(&c), "No problem, we'll ask another time.");
}

#[tokio::test]
async fn message_without_trigger_and_without_default_flow_is_ignored() {
    let h = HarnessBuilder::bundled().build();
    let c = contact("+15550004");

    let disposition = h.say(&c, "m-1", "hello there").await.unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::NoFlow));
    assert!(h.texts(&c).is_empty());
    assert_eq!(h.sessions.commit_count().await, 0);
}

#[tokio::test]
async fn default_flow_catches_untriggered_messages() {
    let h = HarnessBuilder::bundled_with_default("survey").build();
    let c = contact("+15550005");

    let disposition = h.say(&c, "m-1", "hello there").await.unwrap();

    assert_advanced_to(&disposition, SessionStatus::Active, "satisfied");
}

// ════════════════════════════════════════════════════════════════════════════
// Replay protection
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn replayed_message_is_a_no_op() {
    let h = HarnessBuilder::bundled().build();
    let c = contact("+15550006");
    h.say(&c, "m-1", "survey").await.unwrap();
    h.say(&c, "m-2", "maybe").await.unwrap();
    let before = h.latest(&c).await;
    let sent_before = h.texts(&c).len();

    let disposition = h.say(&c, "m-2", "maybe").await.unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::Duplicate));
    let after = h.latest(&c).await;
    assert_eq!(after.version(), before.version());
    assert_eq!(after.position().reprompt_count, 1);
    assert_eq!(h.texts(&c).len(), sent_before);
}

#[tokio::test]
async fn replayed_trigger_does_not_restart_a_finished_conversation() {
    let h = HarnessBuilder::bundled().build();
    let c = contact("+15550007");
    h.say(&c, "m-1", "survey").await.unwrap();
    h.say(&c, "m-2", "no").await.unwrap();
    h.say(&c, "m-3", "cold tea").await.unwrap();
    assert_eq!(h.latest(&c).await.status(), SessionStatus::Completed);

    let disposition = h.say(&c, "m-3", "cold tea").await.unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::Duplicate));
    assert_eq!(h.sessions.sessions_for(&c).await.len(), 1);
}

// ════════════════════════════════════════════════════════════════════════════
// Actions and external callbacks
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn payment_suspends_until_callback_and_duplicate_callback_is_ignored() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-123"))
        .build();
    let c = contact("+15550010");

    order_until_payment(&h, "+15550010").await;

    let texts = h.texts(&c);
    assert!(texts[0].starts_with("Today's teas:"));
    assert!(texts[0].contains("TEA-GREEN"));
    assert!(h
        .last_text(&c)
        .ends_with("Pay here: https://pay.example.test/checkout/PAY-123"));

    let session = h.latest(&c).await;
    assert_eq!(session.awaiting_correlation().map(|k| k.as_str()), Some("PAY-123"));
    assert_eq!(
        session.variables().resolve("place_order.total_cents", &step("pay")),
        Some(&json!(700))
    );
    let orders = h.orders.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, 2);

    let disposition = h.callback("PAY-123", json!({"status": "paid"})).await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::Completed, "paid");
    assert!(h.last_text(&c).starts_with("Payment received for order"));
    let version = h.latest(&c).await.version();

    let again = h.callback("PAY-123", json!({"status": "paid"})).await.unwrap();
    assert_eq!(again, Disposition::Unchanged(UnchangedReason::AlreadyResolved));
    assert_eq!(h.latest(&c).await.version(), version);
    assert_eq!(h.payments.call_count(), 1);
}

#[tokio::test]
async fn declined_payment_callback_routes_to_failure_step() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-9"))
        .build();
    let c = contact("+15550011");
    order_until_payment(&h, "+15550011").await;

    let disposition = h
        .callback("PAY-9", json!({"status": "declined"}))
        .await
        .unwrap();

    assert_advanced_to(&disposition, SessionStatus::Completed, "payment_failed");
}

#[tokio::test]
async fn unknown_callback_key_is_not_found() {
    let h = HarnessBuilder::bundled().build();

    let disposition = h.callback("PAY-404", json!({"status": "paid"})).await.unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::NotFound));
}

#[tokio::test]
async fn inbound_message_while_waiting_is_discarded() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-55"))
        .build();
    let c = contact("+15550012");
    order_until_payment(&h, "+15550012").await;
    let version = h.latest(&c).await.version();

    let disposition = h.say(&c, "o-4", "did it work?").await.unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::Discarded));
    assert_eq!(h.latest(&c).await.version(), version);
    assert_eq!(h.latest(&c).await.status(), SessionStatus::WaitingExternal);
}

#[tokio::test]
async fn intermediate_callback_status_keeps_the_session_waiting() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-7"))
        .build();
    let c = contact("+15550017");
    order_until_payment(&h, "+15550017").await;
    let version = h.latest(&c).await.version();

    let disposition = h
        .callback("PAY-7", json!({"status": "processing"}))
        .await
        .unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::Unmatched));
    let session = h.latest(&c).await;
    assert_eq!(session.version(), version);
    assert_eq!(session.status(), SessionStatus::WaitingExternal);
    assert_eq!(session.awaiting_correlation().map(|k| k.as_str()), Some("PAY-7"));

    let disposition = h.callback("PAY-7", json!({"status": "paid"})).await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::Completed, "paid");
    assert!(h.last_text(&c).starts_with("Payment received for order"));
}

#[tokio::test]
async fn callback_during_scheduled_retry_is_stale() {
    let payments = MockPaymentGateway::new();
    payments.fail_always(GatewayError::Transport("connection reset".into()));
    let h = HarnessBuilder::bundled().payments(payments).build();
    let c = contact("+15550018");
    h.say(&c, "o-1", "order").await.unwrap();
    h.say(&c, "o-2", "TEA-BLACK").await.unwrap();
    h.say(&c, "o-3", "1").await.unwrap();
    let commits = h.sessions.commit_count().await;

    let disposition = h
        .engine
        .process(
            &c,
            Event::ExternalCallback {
                correlation_key: key("PAY-EARLY"),
                payload: json!({"status": "paid"}),
            },
            0,
        )
        .await
        .unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::Stale));
    assert_eq!(h.sessions.commit_count().await, commits);
    let session = h.latest(&c).await;
    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(session.current_step().as_str(), "pay");
    assert!(session.position().suspension.is_some());
}

#[tokio::test]
async fn payment_reference_owned_by_another_session_is_rejected() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-DUP"))
        .build();
    let first = contact("+15550019");
    let second = contact("+15550029");
    order_until_payment(&h, "+15550019").await;

    h.say(&second, "o-1", "order").await.unwrap();
    h.say(&second, "o-2", "tea-black").await.unwrap();
    let err = h.say(&second, "o-3", "1").await.unwrap_err();

    assert!(matches!(err, EngineError::CorrelationTaken(_)));
    assert!(!err.is_transient());
    let stuck = h.latest(&second).await;
    assert_eq!(stuck.current_step().as_str(), "quantity");
    assert_eq!(stuck.awaiting_correlation(), None);

    // The owner still receives its callback.
    let disposition = h.callback("PAY-DUP", json!({"status": "paid"})).await.unwrap();
    assert_advanced_to(&disposition, SessionStatus::Completed, "paid");
    assert_eq!(h.latest(&first).await.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn transient_payment_failures_are_retried_until_on_failure() {
    let payments = MockPaymentGateway::new();
    payments.fail_always(GatewayError::Transport("connection reset".into()));
    let h = HarnessBuilder::bundled().payments(payments).build();
    let c = contact("+15550013");

    h.say(&c, "o-1", "order").await.unwrap();
    h.say(&c, "o-2", "TEA-BLACK").await.unwrap();
    h.say(&c, "o-3", "1").await.unwrap();
    assert_eq!(h.payments.call_count(), 1);
    let parked = h.latest(&c).await;
    assert_eq!(parked.status(), SessionStatus::Active);
    assert!(parked.position().suspension.is_some());

    let ran = h.run_jobs(20).await;

    assert_eq!(ran, 4);
    assert_eq!(h.payments.call_count(), 5);
    let session = h.latest(&c).await;
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.current_step().as_str(), "payment_failed");
    assert!(h.last_text(&c).starts_with("We couldn't take the payment"));
}

#[tokio::test]
async fn recovered_gateway_resumes_on_the_retry() {
    let payments = MockPaymentGateway::new().with_reference("PAY-77");
    payments.fail_next(2, GatewayError::Timeout);
    let h = HarnessBuilder::bundled().payments(payments).build();
    let c = contact("+15550014");

    h.say(&c, "o-1", "order").await.unwrap();
    h.say(&c, "o-2", "TEA-GREEN").await.unwrap();
    h.say(&c, "o-3", "1").await.unwrap();
    h.run_jobs(10).await;

    assert_eq!(h.payments.call_count(), 3);
    let session = h.latest(&c).await;
    assert_eq!(session.status(), SessionStatus::WaitingExternal);
    assert_eq!(session.awaiting_correlation().map(|k| k.as_str()), Some("PAY-77"));
}

const STRICT_PAYMENT: &str = r#"
id: strict
entry: pay
triggers: [pay]
steps:
  - id: pay
    type: action
    action:
      type: initiate_payment
      amount: "500"
      currency: USD
      retry: { max_attempts: 2, base_delay_ms: 10 }
    transitions:
      - to: done
        when: { equals: { var: event.status, value: paid } }
  - id: done
    type: terminal
"#;

#[tokio::test]
async fn exhausted_retries_without_on_failure_halt_the_session() {
    let payments = MockPaymentGateway::new();
    payments.fail_always(GatewayError::Transport("down".into()));
    let h = HarnessBuilder::from_yaml(&[STRICT_PAYMENT])
        .payments(payments)
        .build();
    let c = contact("+15550015");

    h.say(&c, "p-1", "pay").await.unwrap();
    h.run_jobs(10).await;

    let session = h.latest(&c).await;
    assert_eq!(session.status(), SessionStatus::Errored);
    assert!(session.diagnostic().unwrap().contains("initiate_payment"));
    assert_eq!(
        h.last_text(&c),
        InterpreterSettings::default().fallback_message
    );
    assert_eq!(h.payments.call_count(), 2);
}

#[tokio::test]
async fn rejected_payment_is_not_retried() {
    let payments = MockPaymentGateway::new();
    payments.fail_always(GatewayError::Rejected("card declined".into()));
    let h = HarnessBuilder::from_yaml(&[STRICT_PAYMENT])
        .payments(payments)
        .build();
    let c = contact("+15550016");

    h.say(&c, "p-1", "pay").await.unwrap();

    assert_eq!(h.run_jobs(10).await, 0);
    assert_eq!(h.latest(&c).await.status(), SessionStatus::Errored);
    assert_eq!(h.payments.call_count(), 1);
}

// ════════════════════════════════════════════════════════════════════════════
// Optimistic commits
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn conflicting_commit_replays_recorded_action_results() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-321"))
        .build();
    let c = contact("+15550020");
    h.say(&c, "o-1", "order").await.unwrap();
    h.say(&c, "o-2", "tea-green").await.unwrap();

    h.sessions.inject_conflicts(1);
    let disposition = h.say(&c, "o-3", "3").await.unwrap();

    assert_advanced_to(&disposition, SessionStatus::WaitingExternal, "pay");
    assert_eq!(h.payments.call_count(), 1);
    assert_eq!(h.orders.orders().await.len(), 1);
    let payment_links = h
        .texts(&c)
        .iter()
        .filter(|t| t.contains("Pay here"))
        .count();
    assert_eq!(payment_links, 1);
}

// ════════════════════════════════════════════════════════════════════════════
// Authoring errors and flow changes
// ════════════════════════════════════════════════════════════════════════════

const LOOP: &str = r#"
id: loop
entry: a
triggers: [loop]
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

#[tokio::test]
async fn transition_cycle_halts_at_the_hop_limit() {
    let h = HarnessBuilder::from_yaml(&[LOOP])
        .interpreter(InterpreterSettings {
            max_hops: 10,
            ..InterpreterSettings::default()
        })
        .build();
    let c = contact("+15550030");

    let disposition = h.say(&c, "l-1", "loop").await.unwrap();

    match disposition {
        Disposition::Advanced { status, .. } => assert_eq!(status, SessionStatus::Errored),
        other => panic!("unexpected {:?}", other),
    }
    let session = h.latest(&c).await;
    assert!(session.diagnostic().unwrap().contains("10"));
    assert_eq!(h.texts(&c).len(), 1);
}

const ASK_V1: &str = r#"
id: ask
version: 1
entry: name
triggers: [start]
steps:
  - id: name
    type: input
    prompt: "Your name?"
    save_as: name
    transitions:
      - to: bye
  - id: bye
    type: terminal
    text: "Bye {{name}}"
"#;

const ASK_V2_RENAMED: &str = r#"
id: ask
version: 2
entry: full_name
triggers: [start]
steps:
  - id: full_name
    type: input
    prompt: "Your full name?"
    transitions:
      - to: bye
  - id: bye
    type: terminal
"#;

const ASK_V2_COMPATIBLE: &str = r#"
id: ask
version: 2
entry: name
triggers: [start]
steps:
  - id: name
    type: input
    prompt: "Your name, please?"
    save_as: name
    transitions:
      - to: bye
  - id: bye
    type: terminal
    text: "See you, {{name}}!"
"#;

#[tokio::test]
async fn changed_flow_continues_when_the_step_still_exists() {
    let v1 = HarnessBuilder::from_yaml(&[ASK_V1]).build();
    let c = contact("+15550031");
    v1.say(&c, "a-1", "start").await.unwrap();
    let session = v1.latest(&c).await;

    let v2 = HarnessBuilder::from_yaml(&[ASK_V2_COMPATIBLE]).build();
    v2.sessions.seed(session).await;
    let disposition = v2.say(&c, "a-2", "Ada").await.unwrap();

    assert_advanced_to(&disposition, SessionStatus::Completed, "bye");
    assert_eq!(v2.last_text(&c), "See you, Ada!");
    assert_eq!(v2.latest(&c).await.flow_version(), 2);
}

#[tokio::test]
async fn changed_flow_errors_when_the_step_is_gone() {
    let v1 = HarnessBuilder::from_yaml(&[ASK_V1]).build();
    let c = contact("+15550032");
    v1.say(&c, "a-1", "start").await.unwrap();
    let session = v1.latest(&c).await;

    let v2 = HarnessBuilder::from_yaml(&[ASK_V2_RENAMED]).build();
    v2.sessions.seed(session).await;
    let disposition = v2.say(&c, "a-2", "Ada").await.unwrap();

    match disposition {
        Disposition::Advanced { status, .. } => assert_eq!(status, SessionStatus::Errored),
        other => panic!("unexpected {:?}", other),
    }
    let session = v2.latest(&c).await;
    assert!(session.diagnostic().unwrap().contains("'name'"));
}

// ════════════════════════════════════════════════════════════════════════════
// Abandonment
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn abandoning_a_waiting_session_retires_its_correlation() {
    let h = HarnessBuilder::bundled()
        .payments(MockPaymentGateway::new().with_reference("PAY-ab"))
        .build();
    let c = contact("+15550040");
    order_until_payment(&h, "+15550040").await;

    let disposition = h.engine.abandon(&c, "customer left").await.unwrap();

    assert!(disposition.is_advanced());
    let session = h.latest(&c).await;
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.closed_reason(), Some("abandoned: customer left"));

    let late = h.callback("PAY-ab", json!({"status": "paid"})).await.unwrap();
    assert_eq!(late, Disposition::Unchanged(UnchangedReason::AlreadyResolved));
}

#[tokio::test]
async fn abandon_without_open_session_is_not_found() {
    let h = HarnessBuilder::bundled().build();

    let disposition = h.engine.abandon(&contact("+15550041"), "cleanup").await.unwrap();

    assert_eq!(disposition, Disposition::Unchanged(UnchangedReason::NotFound));
}

#[tokio::test]
async fn idle_sweep_abandons_stale_sessions_only() {
    let h = HarnessBuilder::bundled().build();
    let idle = contact("+15550042");
    let finished = contact("+15550043");
    h.say(&idle, "m-1", "survey").await.unwrap();
    h.say(&finished, "m-1", "survey").await.unwrap();
    h.say(&finished, "m-2", "no").await.unwrap();
    h.say(&finished, "m-3", "late delivery").await.unwrap();

    let sweeper = IdleSweeper::new(
        h.engine.clone(),
        h.sessions.clone(),
        h.invocations.clone(),
        IdleSweeperConfig {
            idle_ttl: Duration::from_secs(60),
            ..IdleSweeperConfig::default()
        },
    );

    let early = sweeper.sweep(Timestamp::now()).await.unwrap();
    assert_eq!(early.abandoned, 0);

    let later = sweeper
        .sweep(Timestamp::now().plus(Duration::from_secs(120)))
        .await
        .unwrap();
    assert_eq!(later.abandoned, 1);

    let session = h.latest(&idle).await;
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.closed_reason(), Some("abandoned: idle timeout"));
    assert_eq!(
        h.latest(&finished).await.closed_reason(),
        Some("terminal")
    );
}
