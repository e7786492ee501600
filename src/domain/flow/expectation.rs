//! Expected shapes of user input at input steps.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why an inbound message did not satisfy an input step. Recoverable: the
/// interpreter reprompts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputMismatchError {
    #[error("Message carries no text")]
    NoText,

    #[error("'{got}' is not one of: {}", .options.join(", "))]
    NotAChoice { got: String, options: Vec<String> },

    #[error("'{got}' does not match the expected format")]
    PatternMismatch { got: String },

    #[error("'{got}' is not a number")]
    NotANumber { got: String },

    #[error("{got} is outside the accepted range")]
    OutOfRange { got: String },
}

/// Accepted input shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputExpectation {
    /// Any non-blank text.
    #[default]
    Any,
    /// One of a fixed set, compared trimmed and case-insensitively.
    Choices { options: Vec<String> },
    /// Text matching a regular expression.
    Pattern { regex: String },
    /// A number, optionally bounded (inclusive).
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl InputExpectation {
    /// Checks the inbound text, returning the normalized accepted value.
    pub fn accept(&self, text: Option<&str>) -> Result<Value, InputMismatchError> {
        let raw = text.map(str::trim).filter(|t| !t.is_empty());
        let Some(raw) = raw else {
            return Err(InputMismatchError::NoText);
        };

        match self {
            InputExpectation::Any => Ok(Value::String(raw.to_string())),
            InputExpectation::Choices { options } => options
                .iter()
                .find(|option| option.trim().eq_ignore_ascii_case(raw))
                .map(|option| Value::String(option.clone()))
                .ok_or_else(|| InputMismatchError::NotAChoice {
                    got: raw.to_string(),
                    options: options.clone(),
                }),
            InputExpectation::Pattern { regex } => match Regex::new(regex) {
                Ok(re) if re.is_match(raw) => Ok(Value::String(raw.to_string())),
                _ => Err(InputMismatchError::PatternMismatch {
                    got: raw.to_string(),
                }),
            },
            InputExpectation::Number { min, max } => {
                let number: f64 = raw.parse().map_err(|_| InputMismatchError::NotANumber {
                    got: raw.to_string(),
                })?;
                if !number.is_finite()
                    || min.map_or(false, |m| number < m)
                    || max.map_or(false, |m| number > m)
                {
                    return Err(InputMismatchError::OutOfRange {
                        got: raw.to_string(),
                    });
                }
                Ok(number_value(number))
            }
        }
    }

    /// Static problems detectable at load time.
    pub fn problems(&self) -> Vec<String> {
        match self {
            InputExpectation::Choices { options } if options.is_empty() => {
                vec!["choice list is empty".to_string()]
            }
            InputExpectation::Pattern { regex } => match Regex::new(regex) {
                Ok(_) => vec![],
                Err(err) => vec![format!("invalid input pattern '{}': {}", regex, err)],
            },
            InputExpectation::Number {
                min: Some(min),
                max: Some(max),
            } if min > max => vec![format!("number range {}..{} is empty", min, max)],
            _ => vec![],
        }
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}
