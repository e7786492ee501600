//! Callback webhook signing configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// HMAC-SHA256 key shared with callback senders. Unsigned callbacks are
    /// accepted when unset, which validation forbids in production.
    pub secret: Option<SecretString>,

    /// Maximum age of a signed callback in seconds
    pub tolerance_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_secs: 300,
        }
    }
}

impl WebhookConfig {
    pub fn tolerance(&self) -> Duration {
        Duration::from_secs(self.tolerance_secs)
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        match &self.secret {
            Some(secret) if secret.expose_secret().len() < 16 => {
                Err(ValidationError::WebhookSecretTooShort)
            }
            None if production => Err(ValidationError::MissingRequired("WEBHOOK__SECRET")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_required_in_production() {
        let config = WebhookConfig::default();
        assert!(config.validate(false).is_ok());
        assert_eq!(
            config.validate(true),
            Err(ValidationError::MissingRequired("WEBHOOK__SECRET"))
        );
    }

    #[test]
    fn short_secret_is_rejected() {
        let config = WebhookConfig {
            secret: Some(SecretString::new("short".into())),
            ..Default::default()
        };
        assert_eq!(config.validate(false), Err(ValidationError::WebhookSecretTooShort));
    }
}
