//! In-process audit store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    error::AuditError,
    record::{AuditRecord, GENESIS_HASH},
    store::{AuditFilter, AuditStore, LinkOutcome, Page},
};

#[derive(Debug, Default)]
struct Inner {
    next_sequence_id: i64,
    partitions: HashMap<String, Vec<AuditRecord>>,
}

#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    inner: RwLock<Inner>,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Edit a stored record in place; returns `false` if no record matched.
    #[cfg(test)]
    pub(crate) async fn rewrite<F>(&self, partition: &str, sequence_id: i64, edit: F) -> bool
    where
        F: FnOnce(&mut AuditRecord),
    {
        let mut inner = self.inner.write().await;
        let record = inner
            .partitions
            .get_mut(partition)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|record| record.sequence_id == sequence_id)
            });
        match record {
            Some(record) => {
                edit(record);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self, partition: &str) -> usize {
        self.inner
            .read()
            .await
            .partitions
            .get(partition)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn head_hash(&self, partition: &str) -> Result<String, AuditError> {
        let inner = self.inner.read().await;
        Ok(inner
            .partitions
            .get(partition)
            .and_then(|records| records.last())
            .map_or_else(|| GENESIS_HASH.to_string(), |record| record.hash.clone()))
    }

    async fn insert_linked(
        &self,
        partition: &str,
        mut record: AuditRecord,
    ) -> Result<LinkOutcome, AuditError> {
        let mut inner = self.inner.write().await;
        let head = inner
            .partitions
            .get(partition)
            .and_then(|records| records.last())
            .map_or(GENESIS_HASH, |record| record.hash.as_str())
            .to_string();
        if head != record.previous_hash {
            return Ok(LinkOutcome::Conflict { head });
        }

        inner.next_sequence_id += 1;
        record.sequence_id = inner.next_sequence_id;
        inner
            .partitions
            .entry(partition.to_string())
            .or_default()
            .push(record.clone());
        Ok(LinkOutcome::Inserted(record))
    }

    async fn hash_before(&self, partition: &str, before: i64) -> Result<String, AuditError> {
        let inner = self.inner.read().await;
        Ok(inner
            .partitions
            .get(partition)
            .and_then(|records| {
                records
                    .iter()
                    .rev()
                    .find(|record| record.sequence_id < before)
            })
            .map_or_else(|| GENESIS_HASH.to_string(), |record| record.hash.clone()))
    }

    async fn range(
        &self,
        partition: &str,
        from: i64,
        to: Option<i64>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let inner = self.inner.read().await;
        Ok(inner
            .partitions
            .get(partition)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| {
                        record.sequence_id >= from
                            && to.map_or(true, |to| record.sequence_id <= to)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query(
        &self,
        partition: &str,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let inner = self.inner.read().await;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        Ok(inner
            .partitions
            .get(partition)
            .map(|records| {
                records
                    .iter()
                    .rev()
                    .filter(|record| filter.matches(record))
                    .skip(offset)
                    .take(page.size() as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
