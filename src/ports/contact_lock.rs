//! ContactLock port - per-contact lease shared across worker processes.
//!
//! A lease is a row (holder id + expiry) in the persistence layer. Holders
//! that crash stop renewing; once the lease expires another worker may
//! reclaim it. Reclaims are reported so callers can log them as anomalies.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::{ContactId, DomainError, Timestamp};

/// Result of trying to take a contact's lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseGrant {
    /// The lease was free.
    Acquired { expires_at: Timestamp },
    /// The lease had expired while held by `previous_holder`.
    Reclaimed {
        previous_holder: String,
        expired_at: Timestamp,
        expires_at: Timestamp,
    },
    /// Someone else holds a live lease.
    Busy { holder: String, expires_at: Timestamp },
}

impl LeaseGrant {
    pub fn is_granted(&self) -> bool {
        !matches!(self, LeaseGrant::Busy { .. })
    }
}

/// Port for the distributed per-contact lease.
#[async_trait]
pub trait ContactLock: Send + Sync {
    /// Takes the lease for `holder` if it is free or expired.
    async fn try_acquire(
        &self,
        contact_id: &ContactId,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseGrant, DomainError>;

    /// Releases the lease if `holder` still owns it. Returns whether a lease
    /// was released.
    async fn release(&self, contact_id: &ContactId, holder: &str) -> Result<bool, DomainError>;
}
