//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Engine setting out of range: {0}")]
    InvalidEngineSetting(&'static str),

    #[error("Retry policy invalid: {0}")]
    InvalidRetryPolicy(&'static str),

    #[error("Worker setting out of range: {0}")]
    InvalidWorkerSetting(&'static str),

    #[error("Invalid gateway URL for {0}")]
    InvalidGatewayUrl(&'static str),

    #[error("Webhook secret must be at least 16 characters")]
    WebhookSecretTooShort,
}
