//! OutboxRelay - delivers committed turn effects.
//!
//! Every committed turn carries its outbound messages and scheduled jobs as
//! outbox entries. The engine hands freshly committed entries to
//! [`OutboxRelay::deliver`] right after the commit; the background loop picks
//! up anything left pending by a crash or a failed delivery.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 500ms | How often to check for pending entries |
//! | `batch_size` | 100 | Max entries per poll cycle |
//! | `max_attempts` | 10 | Entries failing this often are left for review |

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, warn};

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{MessageSender, OutboxEffect, OutboxEntry, OutboxStore, TaskQueue};

#[derive(Debug, Clone)]
pub struct OutboxRelayConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub max_attempts: u32,
}

impl Default for OutboxRelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_attempts: 10,
        }
    }
}

impl OutboxRelayConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    sender: Arc<dyn MessageSender>,
    queue: Arc<dyn TaskQueue>,
    config: OutboxRelayConfig,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        sender: Arc<dyn MessageSender>,
        queue: Arc<dyn TaskQueue>,
        config: OutboxRelayConfig,
    ) -> Self {
        Self {
            outbox,
            sender,
            queue,
            config,
        }
    }

    /// Runs the relay loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let mut interval = time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.log_batch_error(self.process_batch().await);
                        return Ok(());
                    }
                }
                _ = interval.tick() => {
                    self.log_batch_error(self.process_batch().await);
                }
            }
        }
    }

    /// Delivers one batch of pending entries; returns how many succeeded.
    pub async fn process_batch(&self) -> Result<usize, DomainError> {
        let entries = self
            .outbox
            .pending(self.config.batch_size, self.config.max_attempts)
            .await?;
        self.deliver(entries).await
    }

    /// Delivers the given entries, marking each delivered or failed.
    pub async fn deliver(&self, entries: Vec<OutboxEntry>) -> Result<usize, DomainError> {
        let mut delivered = 0;
        for entry in entries {
            match self.apply(&entry).await {
                Ok(()) => {
                    self.outbox.mark_delivered(&entry.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        entry_id = %entry.id,
                        contact_id = %entry.contact_id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Outbox delivery failed; will retry"
                    );
                    if entry.attempts + 1 >= self.config.max_attempts {
                        error!(
                            alert = true,
                            entry_id = %entry.id,
                            session_id = %entry.session_id,
                            "Outbox entry exhausted delivery attempts"
                        );
                    }
                    self.outbox.mark_failed(&entry.id, &e.to_string()).await?;
                }
            }
        }
        Ok(delivered)
    }

    async fn apply(&self, entry: &OutboxEntry) -> Result<(), DomainError> {
        match &entry.effect {
            OutboxEffect::Deliver { body } => {
                self.sender.send(&entry.id, &entry.contact_id, body).await
            }
            OutboxEffect::Schedule { job, run_at } => {
                let delay = run_at.remaining_from(&Timestamp::now());
                self.queue.schedule(delay, job.clone()).await.map(|_| ())
            }
        }
    }

    fn log_batch_error(&self, result: Result<usize, DomainError>) {
        if let Err(e) = result {
            error!(error = %e, "Outbox relay batch failed");
        }
    }
}
