//! Structured transition predicates.
//!
//! Predicates are plain data so flows can declare them in YAML:
//!
//! ```yaml
//! when:
//!   any:
//!     - equals: { var: input, value: "yes" }
//!     - one_of: { var: event.status, values: [confirmed, paid] }
//! ```
//!
//! Operands (`var`) reference `event.<field>`, `input` (the input accepted at
//! the current step), a step-local key, or a fully qualified variable key.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::StepId;
use crate::domain::session::{Event, VariableBag};

/// A boolean condition over session variables and the current event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    #[default]
    Always,
    Equals {
        var: String,
        value: Value,
    },
    NotEquals {
        var: String,
        value: Value,
    },
    OneOf {
        var: String,
        values: Vec<Value>,
    },
    Matches {
        var: String,
        pattern: String,
    },
    Exists {
        var: String,
    },
    Missing {
        var: String,
    },
    GreaterThan {
        var: String,
        value: f64,
    },
    LessThan {
        var: String,
        value: f64,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

/// What a predicate can see while being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub step_id: &'a StepId,
    pub variables: &'a VariableBag,
    pub event: Option<&'a Event>,
    /// Input accepted at the current step during this evaluation.
    pub input: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    /// Resolves an operand reference to a value.
    pub fn resolve(&self, var: &str) -> Option<Value> {
        if var == "input" {
            if let Some(input) = self.input {
                return Some(input.clone());
            }
        }
        if let Some(field) = var.strip_prefix("event.") {
            return self.event.and_then(|event| event.field(field));
        }
        self.variables.resolve(var, self.step_id).cloned()
    }
}

impl Predicate {
    /// Evaluates the predicate. Unresolvable operands never match, except
    /// under `missing`.
    pub fn evaluate(&self, scope: &Scope<'_>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Equals { var, value } => scope
                .resolve(var)
                .map_or(false, |actual| loosely_equal(&actual, value)),
            Predicate::NotEquals { var, value } => scope
                .resolve(var)
                .map_or(true, |actual| !loosely_equal(&actual, value)),
            Predicate::OneOf { var, values } => scope.resolve(var).map_or(false, |actual| {
                values.iter().any(|candidate| loosely_equal(&actual, candidate))
            }),
            Predicate::Matches { var, pattern } => {
                let Some(actual) = scope.resolve(var) else {
                    return false;
                };
                match Regex::new(pattern) {
                    Ok(re) => re.is_match(&operand_text(&actual)),
                    Err(_) => false,
                }
            }
            Predicate::Exists { var } => scope.resolve(var).map_or(false, |v| !v.is_null()),
            Predicate::Missing { var } => scope.resolve(var).map_or(true, |v| v.is_null()),
            Predicate::GreaterThan { var, value } => scope
                .resolve(var)
                .and_then(|actual| as_number(&actual))
                .map_or(false, |n| n > *value),
            Predicate::LessThan { var, value } => scope
                .resolve(var)
                .and_then(|actual| as_number(&actual))
                .map_or(false, |n| n < *value),
            Predicate::All(items) => items.iter().all(|p| p.evaluate(scope)),
            Predicate::Any(items) => items.iter().any(|p| p.evaluate(scope)),
            Predicate::Not(inner) => !inner.evaluate(scope),
        }
    }

    /// Static problems detectable at load time.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        self.collect_problems(&mut problems);
        problems
    }

    fn collect_problems(&self, problems: &mut Vec<String>) {
        match self {
            Predicate::Matches { pattern, .. } => {
                if let Err(err) = Regex::new(pattern) {
                    problems.push(format!("invalid pattern '{}': {}", pattern, err));
                }
            }
            Predicate::OneOf { var, values } if values.is_empty() => {
                problems.push(format!("one_of on '{}' has no values", var));
            }
            Predicate::All(items) | Predicate::Any(items) => {
                if items.is_empty() {
                    problems.push("empty all/any list".to_string());
                }
                for item in items {
                    item.collect_problems(problems);
                }
            }
            Predicate::Not(inner) => inner.collect_problems(problems),
            _ => {}
        }
    }
}

/// Equality used by predicates: strings compare trimmed and
/// case-insensitively, numeric strings compare as numbers.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            x.trim().to_lowercase() == y.trim().to_lowercase()
        }
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            s.trim().eq_ignore_ascii_case(if *x { "true" } else { "false" })
        }
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn operand_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CorrelationKey, Timestamp};
    use crate::domain::session::InboundMessage;
    use proptest::prelude::*;
    use serde_json::json;

    fn step() -> StepId {
        StepId::new("ask").unwrap()
    }

    fn eval(predicate: &Predicate, bag: &VariableBag, event: Option<&Event>) -> bool {
        let step = step();
        predicate.evaluate(&Scope {
            step_id: &step,
            variables: bag,
            event,
            input: None,
        })
    }

    fn equals(var: &str, value: Value) -> Predicate {
        Predicate::Equals {
            var: var.into(),
            value,
        }
    }

    #[test]
    fn string_equality_is_trimmed_and_case_insensitive() {
        let mut bag = VariableBag::new();
        bag.set_scoped(&step(), "input", "  YES ");

        assert!(eval(&equals("input", json!("yes")), &bag, None));
        assert!(eval(&equals("ask.input", json!("Yes")), &bag, None));
        assert!(!eval(&equals("input", json!("no")), &bag, None));
    }

    #[test]
    fn numeric_comparisons_accept_numeric_strings() {
        let mut bag = VariableBag::new();
        bag.set_global("qty", "3");

        assert!(eval(&equals("qty", json!(3)), &bag, None));
        assert!(eval(
            &Predicate::GreaterThan {
                var: "qty".into(),
                value: 2.0
            },
            &bag,
            None
        ));
        assert!(!eval(
            &Predicate::LessThan {
                var: "qty".into(),
                value: 3.0
            },
            &bag,
            None
        ));
    }

    #[test]
    fn event_operands_read_callback_payload() {
        let event = Event::ExternalCallback {
            correlation_key: CorrelationKey::new("PAY-123").unwrap(),
            payload: json!({"status": "confirmed"}),
        };
        let bag = VariableBag::new();

        assert!(eval(&equals("event.status", json!("CONFIRMED")), &bag, Some(&event)));
        assert!(eval(
            &Predicate::OneOf {
                var: "event.status".into(),
                values: vec![json!("paid"), json!("confirmed")]
            },
            &bag,
            Some(&event)
        ));
        assert!(!eval(&equals("event.status", json!("failed")), &bag, Some(&event)));
    }

    #[test]
    fn event_text_matches_pattern() {
        let event = Event::InboundMessage(InboundMessage {
            message_id: "m".into(),
            channel: "sms".into(),
            payload: json!("order 42"),
            received_at: Timestamp::now(),
        });
        let predicate = Predicate::Matches {
            var: "event.text".into(),
            pattern: r"^order \d+$".into(),
        };
        assert!(eval(&predicate, &VariableBag::new(), Some(&event)));
    }

    #[test]
    fn explicit_input_takes_precedence() {
        let bag = VariableBag::new();
        let step = step();
        let input = json!("no");
        let scope = Scope {
            step_id: &step,
            variables: &bag,
            event: None,
            input: Some(&input),
        };
        assert!(equals("input", json!("NO")).evaluate(&scope));
    }

    #[test]
    fn exists_and_missing() {
        let mut bag = VariableBag::new();
        bag.set_global("name", "Ada");

        assert!(eval(&Predicate::Exists { var: "name".into() }, &bag, None));
        assert!(eval(&Predicate::Missing { var: "email".into() }, &bag, None));
        assert!(!eval(&Predicate::Missing { var: "name".into() }, &bag, None));
        assert!(eval(
            &Predicate::NotEquals {
                var: "email".into(),
                value: json!("x")
            },
            &bag,
            None
        ));
    }

    #[test]
    fn combinators_compose() {
        let mut bag = VariableBag::new();
        bag.set_global("a", "1");
        let yes = equals("a", json!(1));
        let no = equals("a", json!(2));

        assert!(eval(&Predicate::All(vec![yes.clone(), Predicate::Always]), &bag, None));
        assert!(!eval(&Predicate::All(vec![yes.clone(), no.clone()]), &bag, None));
        assert!(eval(&Predicate::Any(vec![no.clone(), yes]), &bag, None));
        assert!(eval(&Predicate::Not(Box::new(no)), &bag, None));
    }

    #[test]
    fn problems_report_bad_patterns_and_empty_lists() {
        let predicate = Predicate::Any(vec![
            Predicate::Matches {
                var: "input".into(),
                pattern: "(".into(),
            },
            Predicate::OneOf {
                var: "input".into(),
                values: vec![],
            },
            Predicate::All(vec![]),
        ]);
        assert_eq!(predicate.problems().len(), 3);
        assert!(Predicate::Always.problems().is_empty());
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
any:
  - equals: { var: input, value: "yes" }
  - not:
      missing: { var: name }
"#;
        let parse = |source: &str| -> Predicate {
            serde_yaml::with::singleton_map_recursive::deserialize(
                serde_yaml::Deserializer::from_str(source),
            )
            .unwrap()
        };
        let predicate = parse(yaml);
        assert_eq!(
            predicate,
            Predicate::Any(vec![
                equals("input", json!("yes")),
                Predicate::Not(Box::new(Predicate::Missing { var: "name".into() })),
            ])
        );

        assert_eq!(parse("always"), Predicate::Always);
        assert_eq!(
            parse("one_of: { var: event.status, values: [paid, confirmed] }"),
            Predicate::OneOf {
                var: "event.status".into(),
                values: vec![json!("paid"), json!("confirmed")],
            }
        );
    }

    proptest! {
        #[test]
        fn not_inverts_any_equality(stored in "[a-zA-Z ]{0,12}", candidate in "[a-zA-Z ]{0,12}") {
            let mut bag = VariableBag::new();
            bag.set_global("v", stored);
            let p = equals("v", json!(candidate));
            prop_assert_eq!(
                eval(&Predicate::Not(Box::new(p.clone())), &bag, None),
                !eval(&p, &bag, None)
            );
        }

        #[test]
        fn equality_ignores_case_and_padding(word in "[a-z]{1,10}", pad in " {0,3}") {
            let mut bag = VariableBag::new();
            bag.set_global("v", format!("{}{}{}", pad, word.to_uppercase(), pad));
            prop_assert!(eval(&equals("v", json!(word)), &bag, None));
        }
    }
}
