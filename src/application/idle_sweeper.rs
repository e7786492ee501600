//! IdleSweeper - closes sessions nobody has touched for too long and prunes
//! old invocation log rows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use crate::domain::foundation::Timestamp;
use crate::ports::{InvocationLog, SessionRepository};

use super::engine::{Disposition, FlowEngine};
use super::errors::EngineError;

#[derive(Debug, Clone)]
pub struct IdleSweeperConfig {
    pub sweep_interval: Duration,
    /// Open sessions not updated within this window are abandoned.
    pub idle_ttl: Duration,
    /// Invocation log rows older than this are deleted.
    pub invocation_retention: Duration,
    pub batch_size: u32,
}

impl Default for IdleSweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(24 * 60 * 60),
            invocation_retention: Duration::from_secs(7 * 24 * 60 * 60),
            batch_size: 100,
        }
    }
}

/// Result of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub abandoned: usize,
    pub invocations_pruned: u64,
}

pub struct IdleSweeper {
    engine: Arc<FlowEngine>,
    sessions: Arc<dyn SessionRepository>,
    invocations: Arc<dyn InvocationLog>,
    config: IdleSweeperConfig,
}

impl IdleSweeper {
    pub fn new(
        engine: Arc<FlowEngine>,
        sessions: Arc<dyn SessionRepository>,
        invocations: Arc<dyn InvocationLog>,
        config: IdleSweeperConfig,
    ) -> Self {
        Self {
            engine,
            sessions,
            invocations,
            config,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(Timestamp::now()).await {
                        error!(error = %e, "Idle sweep failed");
                    }
                }
            }
        }
    }

    /// Abandons sessions idle as of `now` and prunes the invocation log.
    pub async fn sweep(&self, now: Timestamp) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();

        let idle = self
            .sessions
            .find_idle(now.minus(self.config.idle_ttl), self.config.batch_size)
            .await?;
        for session in idle {
            match self.engine.abandon(session.contact_id(), "idle timeout").await {
                Ok(Disposition::Advanced { .. }) => report.abandoned += 1,
                Ok(_) => {}
                Err(e) => warn!(
                    session_id = %session.id(),
                    contact_id = %session.contact_id(),
                    error = %e,
                    "Could not abandon idle session"
                ),
            }
        }

        report.invocations_pruned = self
            .invocations
            .delete_before(now.minus(self.config.invocation_retention))
            .await?;

        if report.abandoned > 0 || report.invocations_pruned > 0 {
            info!(
                abandoned = report.abandoned,
                invocations_pruned = report.invocations_pruned,
                "Idle sweep finished"
            );
        }
        Ok(report)
    }
}
