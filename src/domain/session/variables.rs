//! Variable bag carried by a session across turns.
//!
//! Keys are unique. Values produced by a step are namespaced as
//! `<step_id>.<key>`; explicitly saved inputs (`save_as`) live at the top
//! level under the chosen name.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::foundation::StepId;

/// Namespaced key/value store of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableBag(BTreeMap<String, Value>);

impl VariableBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the namespaced key for a step-local variable.
    pub fn scoped_key(step_id: &StepId, key: &str) -> String {
        format!("{}.{}", step_id, key)
    }

    /// Returns the value stored under an exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stores a step-local variable under `<step_id>.<key>`.
    pub fn set_scoped(&mut self, step_id: &StepId, key: &str, value: impl Into<Value>) {
        self.0.insert(Self::scoped_key(step_id, key), value.into());
    }

    /// Stores a top-level variable.
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges action outputs into the step's namespace.
    pub fn merge_outputs(&mut self, step_id: &StepId, outputs: &BTreeMap<String, Value>) {
        for (key, value) in outputs {
            self.set_scoped(step_id, key, value.clone());
        }
    }

    /// Resolves a reference as seen from `current_step`.
    ///
    /// An exact key wins; otherwise the key is looked up in the current step's
    /// namespace. Dotted paths fall back to descending into JSON objects, so
    /// `pay.callback.status` finds `{"pay.callback": {"status": ..}}`.
    pub fn resolve(&self, key: &str, current_step: &StepId) -> Option<&Value> {
        let scoped = Self::scoped_key(current_step, key);
        if let Some(value) = self.0.get(key).or_else(|| self.0.get(&scoped)) {
            return Some(value);
        }
        self.descend(key).or_else(|| self.descend(&scoped))
    }

    fn descend(&self, key: &str) -> Option<&Value> {
        let mut split = key.len();
        while let Some(idx) = key[..split].rfind('.') {
            if let Some(root) = self.0.get(&key[..idx]) {
                return lookup_path(root, &key[idx + 1..]);
            }
            split = idx;
        }
        None
    }

    /// Resolves a reference and renders it as display text.
    pub fn resolve_text(&self, key: &str, current_step: &StepId) -> Option<String> {
        self.resolve(key, current_step).map(value_to_text)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Follows a dotted path through nested JSON objects.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Renders a JSON value the way a user should read it.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
