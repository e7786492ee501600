//! Load-time structural validation of flow definitions.
//!
//! A definition that passes has: at least one step, unique step ids, an
//! existing entry step, no dangling transition/fallback/failure targets, no
//! dead-end non-terminal steps, no transitions out of terminal steps, and no
//! orphan steps other than those marked `subflow_entry`.

use std::collections::{HashSet, VecDeque};

use crate::domain::foundation::StepId;

use super::definition::{FlowDefinition, StepKind};
use super::errors::{FlowError, ValidationProblem};

/// Validates a definition, collecting every problem before failing.
pub fn validate_flow(flow: &FlowDefinition) -> Result<(), FlowError> {
    let problems = collect_problems(flow);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(FlowError::Invalid {
            flow_id: flow.id.to_string(),
            problems,
        })
    }
}

fn collect_problems(flow: &FlowDefinition) -> Vec<ValidationProblem> {
    let mut problems = Vec::new();

    if flow.steps.is_empty() {
        problems.push(ValidationProblem::flow("flow has no steps"));
        return problems;
    }

    let mut ids: HashSet<&StepId> = HashSet::new();
    for step in &flow.steps {
        if !ids.insert(&step.id) {
            problems.push(ValidationProblem::step(&step.id, "duplicate step id"));
        }
    }

    if !ids.contains(&flow.entry) {
        problems.push(ValidationProblem::flow(format!(
            "entry step '{}' does not exist",
            flow.entry
        )));
    }

    for trigger in &flow.triggers {
        if trigger.trim().is_empty() {
            problems.push(ValidationProblem::flow("blank trigger keyword"));
        }
    }

    for step in &flow.steps {
        for target in step.successors() {
            if !ids.contains(target) {
                problems.push(ValidationProblem::step(
                    &step.id,
                    format!("target '{}' does not exist", target),
                ));
            }
        }

        if step.is_terminal() {
            if !step.transitions.is_empty() {
                problems.push(ValidationProblem::step(
                    &step.id,
                    "terminal step declares transitions",
                ));
            }
        } else if step.transitions.is_empty() {
            problems.push(ValidationProblem::step(
                &step.id,
                format!("{} step has no outgoing transitions", step.kind.name()),
            ));
        }

        for transition in &step.transitions {
            for problem in transition.when.problems() {
                problems.push(ValidationProblem::step(&step.id, problem));
            }
        }

        if let StepKind::Input { expects, .. } = &step.kind {
            for problem in expects.problems() {
                problems.push(ValidationProblem::step(&step.id, problem));
            }
        }
    }

    for orphan in orphans(flow) {
        problems.push(ValidationProblem::step(
            orphan,
            "step is unreachable from the entry step and is not a subflow entry",
        ));
    }

    problems
}

/// Steps not reachable from the entry or from any subflow entry.
fn orphans(flow: &FlowDefinition) -> Vec<&StepId> {
    let mut reached: HashSet<&StepId> = HashSet::new();
    let mut queue: VecDeque<&StepId> = VecDeque::new();

    queue.push_back(&flow.entry);
    for step in flow.steps.iter().filter(|s| s.subflow_entry) {
        queue.push_back(&step.id);
    }

    while let Some(id) = queue.pop_front() {
        if !reached.insert(id) {
            continue;
        }
        if let Some(step) = flow.step(id) {
            queue.extend(step.successors());
        }
    }

    flow.steps
        .iter()
        .map(|s| &s.id)
        .filter(|id| !reached.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> FlowDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn messages(flow: &FlowDefinition) -> Vec<String> {
        match validate_flow(flow) {
            Ok(()) => vec![],
            Err(FlowError::Invalid { problems, .. }) => {
                problems.iter().map(ToString::to_string).collect()
            }
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn well_formed_flow_passes() {
        let flow = parse(
            r#"
id: hello
entry: greet
steps:
  - id: greet
    type: message
    text: "Hi!"
    transitions: [{ to: done }]
  - id: done
    type: terminal
"#,
        );
        assert!(validate_flow(&flow).is_ok());
    }

    #[test]
    fn dangling_target_is_rejected() {
        let flow = parse(
            r#"
id: broken
entry: greet
steps:
  - id: greet
    type: message
    text: "Hi!"
    transitions: [{ to: nowhere }]
"#,
        );
        let problems = messages(&flow);
        assert!(problems.iter().any(|p| p.contains("target 'nowhere' does not exist")));
    }

    #[test]
    fn missing_entry_is_rejected() {
        let flow = parse(
            r#"
id: broken
entry: start
steps:
  - id: done
    type: terminal
"#,
        );
        let problems = messages(&flow);
        assert!(problems.iter().any(|p| p.contains("entry step 'start' does not exist")));
    }

    #[test]
    fn orphans_are_rejected_unless_marked() {
        let yaml = |marked: bool| {
            format!(
                r#"
id: flow
entry: start
steps:
  - id: start
    type: terminal
  - id: side
    type: message
    text: "side door"
    subflow_entry: {}
    transitions: [{{ to: side_end }}]
  - id: side_end
    type: terminal
"#,
                marked
            )
        };

        let problems = messages(&parse(&yaml(false)));
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|p| p.contains("unreachable")));

        assert!(messages(&parse(&yaml(true))).is_empty());
    }

    #[test]
    fn duplicate_ids_dead_ends_and_terminal_edges_are_rejected() {
        let flow = parse(
            r#"
id: flow
entry: a
steps:
  - id: a
    type: branch
    transitions: [{ to: b }]
  - id: b
    type: message
    text: "stuck"
  - id: a
    type: terminal
    transitions: [{ to: b }]
"#,
        );
        let problems = messages(&flow);
        assert!(problems.iter().any(|p| p.contains("duplicate step id")));
        assert!(problems.iter().any(|p| p.contains("message step has no outgoing transitions")));
        assert!(problems.iter().any(|p| p.contains("terminal step declares transitions")));
    }

    #[test]
    fn bad_patterns_and_empty_choices_are_rejected() {
        let flow = parse(
            r#"
id: flow
entry: ask
steps:
  - id: ask
    type: input
    prompt: "?"
    expects: { kind: choices, options: [] }
    transitions:
      - to: done
        when: { matches: { var: input, pattern: "(" } }
  - id: done
    type: terminal
"#,
        );
        let problems = messages(&flow);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn failure_edges_count_for_reachability() {
        let flow = parse(
            r#"
id: flow
entry: pay
steps:
  - id: pay
    type: action
    action: { type: send_message, text: "hi" }
    on_failure: sorry
    transitions: [{ to: done }]
  - id: sorry
    type: terminal
  - id: done
    type: terminal
"#,
        );
        assert!(validate_flow(&flow).is_ok());
    }
}
