//! ConcurrencyGuard - per-contact mutual exclusion.
//!
//! Two layers:
//!
//! - A process-local FIFO mutex per contact, so waiters inside one worker
//!   are served in arrival order without hammering the lease table.
//! - A lease row in the shared [`ContactLock`] store (holder id + expiry),
//!   which makes exclusion hold across worker processes. A crashed holder's
//!   lease expires and is reclaimed; reclaims are logged as anomalies.
//!
//! Acquisition is bounded by `wait_timeout`; callers requeue on
//! [`GuardError::LockTimeout`] instead of blocking. A held lease is renewed
//! every third of `lease_ttl`, so a long turn never outlives it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::foundation::{ContactId, DomainError};
use crate::ports::{ContactLock, LeaseGrant};

type LocalSlots = Arc<Mutex<HashMap<ContactId, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Debug, Clone, Error)]
pub enum GuardError {
    #[error("Timed out after {waited_ms}ms waiting for contact {contact_id}")]
    LockTimeout { contact_id: ContactId, waited_ms: u64 },

    #[error("Lease store failure: {0}")]
    Store(#[from] DomainError),
}

#[derive(Debug, Clone)]
pub struct GuardSettings {
    /// Lifetime of a lease row; a crashed holder is reclaimable after it.
    pub lease_ttl: Duration,
    /// Upper bound on waiting for a lease.
    pub wait_timeout: Duration,
    /// Delay between attempts while another process holds the lease.
    pub poll_interval: Duration,
    /// Prefix of holder ids, identifying this worker process.
    pub node_id: String,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(25),
            node_id: "convoflow".to_string(),
        }
    }
}

pub struct ConcurrencyGuard {
    store: Arc<dyn ContactLock>,
    local: LocalSlots,
    settings: GuardSettings,
}

impl ConcurrencyGuard {
    pub fn new(store: Arc<dyn ContactLock>, settings: GuardSettings) -> Self {
        Self {
            store,
            local: Arc::default(),
            settings,
        }
    }

    /// Acquires the lease for `contact_id`.
    pub async fn acquire(&self, contact_id: &ContactId) -> Result<Lease, GuardError> {
        let started = Instant::now();
        let deadline = started + self.settings.wait_timeout;
        let timeout_err = || GuardError::LockTimeout {
            contact_id: contact_id.clone(),
            waited_ms: started.elapsed().as_millis() as u64,
        };

        let slot = {
            let mut slots = self.local.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(contact_id.clone()).or_default().clone()
        };
        let permit = match tokio::time::timeout_at(deadline, slot.lock_owned()).await {
            Ok(permit) => permit,
            Err(_) => {
                prune(&self.local, contact_id);
                return Err(timeout_err());
            }
        };

        let holder = format!("{}:{}", self.settings.node_id, Uuid::new_v4());
        loop {
            let grant = match self
                .store
                .try_acquire(contact_id, &holder, self.settings.lease_ttl)
                .await
            {
                Ok(grant) => grant,
                Err(e) => {
                    drop(permit);
                    prune(&self.local, contact_id);
                    return Err(GuardError::Store(e));
                }
            };

            match grant {
                LeaseGrant::Acquired { .. } => {
                    debug!(contact_id = %contact_id, holder = %holder, "Lease acquired");
                    break;
                }
                LeaseGrant::Reclaimed {
                    previous_holder,
                    expired_at,
                    ..
                } => {
                    warn!(
                        contact_id = %contact_id,
                        holder = %holder,
                        previous_holder = %previous_holder,
                        expired_at = %expired_at,
                        anomaly = true,
                        "Reclaimed expired lease; previous holder may have crashed mid-turn"
                    );
                    break;
                }
                LeaseGrant::Busy { holder: other, .. } => {
                    let now = Instant::now();
                    if now >= deadline {
                        drop(permit);
                        prune(&self.local, contact_id);
                        debug!(contact_id = %contact_id, busy_holder = %other, "Lease wait expired");
                        return Err(timeout_err());
                    }
                    let pause = self.settings.poll_interval.min(deadline - now);
                    tokio::time::sleep(pause).await;
                }
            }
        }

        let renewer = spawn_renewal(
            self.store.clone(),
            contact_id.clone(),
            holder.clone(),
            self.settings.lease_ttl,
        );
        Ok(Lease {
            contact_id: contact_id.clone(),
            holder,
            store: self.store.clone(),
            local: self.local.clone(),
            permit: Some(permit),
            renewer: Some(renewer),
            released: false,
        })
    }

    /// Number of contacts with a local slot (held or awaited).
    pub fn local_slots(&self) -> usize {
        self.local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Extends the lease row until aborted. Stops once another holder owns it.
fn spawn_renewal(
    store: Arc<dyn ContactLock>,
    contact_id: ContactId,
    holder: String,
    ttl: Duration,
) -> JoinHandle<()> {
    let period = (ttl / 3).max(Duration::from_millis(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            match store.try_acquire(&contact_id, &holder, ttl).await {
                Ok(LeaseGrant::Busy { holder: other, .. }) => {
                    warn!(
                        contact_id = %contact_id,
                        holder = %holder,
                        other_holder = %other,
                        anomaly = true,
                        "Lease lost during turn"
                    );
                    return;
                }
                Ok(_) => debug!(contact_id = %contact_id, holder = %holder, "Lease renewed"),
                Err(e) => warn!(
                    contact_id = %contact_id,
                    holder = %holder,
                    error = %e,
                    "Failed to renew lease; retrying"
                ),
            }
        }
    })
}

/// Drops the local slot of `contact_id` when nobody holds or awaits it.
fn prune(local: &LocalSlots, contact_id: &ContactId) {
    let mut slots = local.lock().unwrap_or_else(PoisonError::into_inner);
    if slots
        .get(contact_id)
        .is_some_and(|slot| Arc::strong_count(slot) == 1)
    {
        slots.remove(contact_id);
    }
}

/// A held contact lease. Release it explicitly with [`Lease::release`];
/// dropping it releases in the background.
pub struct Lease {
    contact_id: ContactId,
    holder: String,
    store: Arc<dyn ContactLock>,
    local: LocalSlots,
    permit: Option<OwnedMutexGuard<()>>,
    renewer: Option<JoinHandle<()>>,
    released: bool,
}

impl Lease {
    pub fn contact_id(&self) -> &ContactId {
        &self.contact_id
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Releases the lease row, then the local slot.
    pub async fn release(mut self) {
        self.released = true;
        if let Some(renewer) = self.renewer.take() {
            renewer.abort();
            let _ = renewer.await;
        }
        match self.store.release(&self.contact_id, &self.holder).await {
            Ok(true) => {}
            Ok(false) => warn!(
                contact_id = %self.contact_id,
                holder = %self.holder,
                anomaly = true,
                "Lease was taken over before release"
            ),
            Err(e) => warn!(
                contact_id = %self.contact_id,
                error = %e,
                "Failed to release lease; it will expire"
            ),
        }
        self.permit.take();
        prune(&self.local, &self.contact_id);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let renewer = self.renewer.take();
        if let Some(renewer) = &renewer {
            renewer.abort();
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let contact_id = self.contact_id.clone();
            let holder = self.holder.clone();
            handle.spawn(async move {
                if let Some(renewer) = renewer {
                    let _ = renewer.await;
                }
                let _ = store.release(&contact_id, &holder).await;
            });
        }
        self.permit.take();
        prune(&self.local, &self.contact_id);
    }
}
