//! In-memory session store.
//!
//! Implements [`SessionRepository`] and [`OutboxStore`] over one lock, so a
//! commit (session + outbox + correlations) is atomic exactly like the
//! PostgreSQL transaction it stands in for. Used by tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{
    ContactId, CorrelationKey, DomainError, InvocationId, SessionId, Timestamp,
};
use crate::domain::session::Session;
use crate::ports::{
    CorrelationChange, CorrelationRecord, OutboxEntry, OutboxStatus, OutboxStore, SessionCommit,
    SessionRepository,
};

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, Session>,
    correlations: HashMap<CorrelationKey, CorrelationRecord>,
    outbox: Vec<OutboxEntry>,
    commits: u64,
}

/// In-memory implementation of the session store and its outbox.
#[derive(Default)]
pub struct InMemorySessionStore {
    state: RwLock<State>,
    injected_conflicts: AtomicU32,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Test helpers
    // ════════════════════════════════════════════════════════════════════════════

    /// Makes the next `count` commits fail with a concurrency conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub async fn commit_count(&self) -> u64 {
        self.state.read().await.commits
    }

    /// Every session of a contact, oldest first.
    pub async fn sessions_for(&self, contact_id: &ContactId) -> Vec<Session> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.contact_id() == contact_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| *s.created_at());
        sessions
    }

    /// Snapshot of all outbox entries in commit order.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.state.read().await.outbox.clone()
    }

    /// Stores a session directly, bypassing version checks.
    pub async fn seed(&self, session: Session) {
        self.state
            .write()
            .await
            .sessions
            .insert(*session.id(), session);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn find_open_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .find(|s| s.contact_id() == contact_id && s.is_open())
            .cloned())
    }

    async fn find_latest_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.contact_id() == contact_id)
            .max_by_key(|s| (*s.updated_at(), *s.created_at()))
            .cloned())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        Ok(self.state.read().await.sessions.get(id).cloned())
    }

    async fn commit(&self, commit: SessionCommit) -> Result<(), DomainError> {
        let mut state = self.state.write().await;

        if self.take_injected_conflict() {
            return Err(DomainError::conflict(commit.expected_version, None));
        }

        let session = commit.session;
        if commit.expected_version == 0 {
            let clash = state.sessions.contains_key(session.id())
                || state
                    .sessions
                    .values()
                    .any(|s| s.contact_id() == session.contact_id() && s.is_open());
            if clash {
                return Err(DomainError::conflict(0, None)
                    .with_detail("contact_id", session.contact_id().to_string()));
            }
        } else {
            let stored = state.sessions.get(session.id()).map(Session::version);
            if stored != Some(commit.expected_version) {
                return Err(DomainError::conflict(commit.expected_version, stored));
            }
        }

        for change in &commit.correlations {
            if let CorrelationChange::Register(key) = change {
                match state.correlations.get(key) {
                    Some(record) if record.session_id != *session.id() => {
                        return Err(DomainError::correlation_taken(
                            key.as_str(),
                            record.session_id.to_string(),
                        ));
                    }
                    _ => {}
                }
            }
        }

        let now = Timestamp::now();
        for change in commit.correlations {
            match change {
                CorrelationChange::Register(key) => {
                    state
                        .correlations
                        .entry(key.clone())
                        .or_insert_with(|| CorrelationRecord {
                            correlation_key: key,
                            session_id: *session.id(),
                            contact_id: session.contact_id().clone(),
                            created_at: now,
                            resolved_at: None,
                        });
                }
                CorrelationChange::Resolve(key) => {
                    if let Some(record) = state.correlations.get_mut(&key) {
                        record.resolved_at.get_or_insert(now);
                    }
                }
            }
        }

        for entry in commit.outbox {
            if !state.outbox.iter().any(|e| e.id == entry.id) {
                state.outbox.push(entry);
            }
        }

        state.sessions.insert(*session.id(), session);
        state.commits += 1;
        Ok(())
    }

    async fn find_correlation(
        &self,
        key: &CorrelationKey,
    ) -> Result<Option<CorrelationRecord>, DomainError> {
        Ok(self.state.read().await.correlations.get(key).cloned())
    }

    async fn find_idle(
        &self,
        updated_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Session>, DomainError> {
        let state = self.state.read().await;
        let mut idle: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.is_open() && s.updated_at().is_before(&updated_before))
            .cloned()
            .collect();
        idle.sort_by_key(|s| *s.updated_at());
        idle.truncate(limit as usize);
        Ok(idle)
    }
}

#[async_trait]
impl OutboxStore for InMemorySessionStore {
    async fn pending(&self, limit: u32, max_attempts: u32) -> Result<Vec<OutboxEntry>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| match e.status {
                OutboxStatus::Pending => true,
                OutboxStatus::Failed => e.attempts < max_attempts,
                OutboxStatus::Delivered => false,
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, id: &InvocationId) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.outbox.iter_mut().find(|e| &e.id == id) {
            if entry.status != OutboxStatus::Delivered {
                entry.mark_delivered();
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &InvocationId, error: &str) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.outbox.iter_mut().find(|e| &e.id == id) {
            entry.mark_failed(error);
        }
        Ok(())
    }
}
