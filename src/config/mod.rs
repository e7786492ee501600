//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `CONVOFLOW` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use convoflow::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod actions;
mod database;
mod engine;
mod error;
mod flows;
mod gateway;
mod redis;
mod server;
mod webhook;
mod workers;

pub use actions::ActionsConfig;
pub use database::DatabaseConfig;
pub use engine::EngineConfig;
pub use error::{ConfigError, ValidationError};
pub use flows::FlowsConfig;
pub use gateway::GatewayConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use webhook::WebhookConfig;
pub use workers::WorkersConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP intake (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL: sessions, outbox, leases, invocation log, orders
    pub database: DatabaseConfig,

    /// Redis: task queue
    pub redis: RedisConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub flows: FlowsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CONVOFLOW` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// - `CONVOFLOW__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `CONVOFLOW__ENGINE__LOCK_WAIT_MS=2000` -> `engine.lock_wait_ms = 2000`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CONVOFLOW")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.engine.validate()?;
        self.actions.validate()?;
        self.workers.validate()?;
        self.flows.validate()?;
        self.gateway.validate()?;
        self.webhook.validate(self.is_production())?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
