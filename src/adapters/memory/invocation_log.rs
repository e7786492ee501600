//! In-memory invocation log.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, InvocationId, Timestamp};
use crate::ports::{InvocationLog, InvocationRecord, SaveResult};

#[derive(Default)]
pub struct InMemoryInvocationLog {
    records: RwLock<HashMap<InvocationId, InvocationRecord>>,
}

impl InMemoryInvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl InvocationLog for InMemoryInvocationLog {
    async fn get(&self, id: &InvocationId) -> Result<Option<InvocationRecord>, DomainError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn record(&self, record: InvocationRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.invocation_id) {
            return Ok(SaveResult::AlreadyExists);
        }
        records.insert(record.invocation_id.clone(), record);
        Ok(SaveResult::Inserted)
    }

    async fn delete_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let start = records.len();
        records.retain(|_, r| !r.recorded_at.is_before(&before));
        Ok((start - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{ActionResult, ActionType};
    use std::time::Duration;

    fn record(id: &str, result: ActionResult) -> InvocationRecord {
        InvocationRecord {
            invocation_id: InvocationId::from_parts(&[id]),
            action_type: ActionType::CreateOrder,
            result,
            recorded_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn first_record_wins() {
        let log = InMemoryInvocationLog::new();

        let first = record("a", ActionResult::ok().with_output("order_id", "1"));
        let second = record("a", ActionResult::ok().with_output("order_id", "2"));

        assert_eq!(log.record(first).await.unwrap(), SaveResult::Inserted);
        assert_eq!(log.record(second).await.unwrap(), SaveResult::AlreadyExists);

        let stored = log
            .get(&InvocationId::from_parts(&["a"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.result.outputs["order_id"], "1");
    }

    #[tokio::test]
    async fn delete_before_prunes_old_records() {
        let log = InMemoryInvocationLog::new();
        log.record(record("a", ActionResult::ok())).await.unwrap();

        let deleted = log
            .delete_before(Timestamp::now().plus(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(log.is_empty().await);
    }
}
