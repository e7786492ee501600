//! In-memory contact lease table.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::foundation::{ContactId, DomainError, Timestamp};
use crate::ports::{ContactLock, LeaseGrant};

#[derive(Debug, Clone)]
struct LeaseRow {
    holder: String,
    expires_at: Timestamp,
}

/// Lease table held in process memory.
#[derive(Default)]
pub struct InMemoryContactLock {
    leases: Mutex<HashMap<ContactId, LeaseRow>>,
}

impl InMemoryContactLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plants a lease as if another worker held it (e.g. one that crashed).
    pub async fn plant(&self, contact_id: ContactId, holder: &str, expires_at: Timestamp) {
        self.leases.lock().await.insert(
            contact_id,
            LeaseRow {
                holder: holder.to_string(),
                expires_at,
            },
        );
    }

    /// Current holder of a contact's lease, expired or not.
    pub async fn holder(&self, contact_id: &ContactId) -> Option<String> {
        self.leases
            .lock()
            .await
            .get(contact_id)
            .map(|row| row.holder.clone())
    }
}

#[async_trait]
impl ContactLock for InMemoryContactLock {
    async fn try_acquire(
        &self,
        contact_id: &ContactId,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseGrant, DomainError> {
        let now = Timestamp::now();
        let expires_at = now.plus(ttl);
        let mut leases = self.leases.lock().await;

        let grant = match leases.get(contact_id) {
            None => LeaseGrant::Acquired { expires_at },
            Some(row) if row.holder == holder => LeaseGrant::Acquired { expires_at },
            Some(row) if !row.expires_at.is_after(&now) => LeaseGrant::Reclaimed {
                previous_holder: row.holder.clone(),
                expired_at: row.expires_at,
                expires_at,
            },
            Some(row) => {
                return Ok(LeaseGrant::Busy {
                    holder: row.holder.clone(),
                    expires_at: row.expires_at,
                })
            }
        };

        leases.insert(
            contact_id.clone(),
            LeaseRow {
                holder: holder.to_string(),
                expires_at,
            },
        );
        Ok(grant)
    }

    async fn release(&self, contact_id: &ContactId, holder: &str) -> Result<bool, DomainError> {
        let mut leases = self.leases.lock().await;
        match leases.get(contact_id) {
            Some(row) if row.holder == holder => {
                leases.remove(contact_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
