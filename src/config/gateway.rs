//! External gateway configuration (messaging, payments, catalog)
//!
//! Each gateway without a URL falls back to its in-process implementation,
//! which is what local development and the test suite run against.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the messaging channel API
    pub messaging_url: Option<String>,

    /// Base URL of the payment provider API
    pub payment_url: Option<String>,

    /// Base URL of the product catalog API
    pub catalog_url: Option<String>,

    /// Bearer token sent to every gateway
    pub api_key: Option<SecretString>,

    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            messaging_url: None,
            payment_url: None,
            catalog_url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let urls = [
            ("messaging_url", &self.messaging_url),
            ("payment_url", &self.payment_url),
            ("catalog_url", &self.catalog_url),
        ];
        for (name, url) in urls {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ValidationError::InvalidGatewayUrl(name));
                }
            }
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}
