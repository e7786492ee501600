//! `{{variable}}` placeholder rendering for message text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::foundation::StepId;
use crate::domain::session::VariableBag;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Replaces placeholders with variables resolved from `current_step`.
/// Unknown variables render as an empty string.
pub fn render(template: &str, variables: &VariableBag, current_step: &StepId) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            variables
                .resolve_text(&caps[1], current_step)
                .unwrap_or_default()
        })
        .into_owned()
}
