use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use super::{
    error::AuditError,
    record::{AuditEvent, AuditRecord},
    store::{AuditFilter, AuditStore, LinkOutcome, Page},
};
use crate::clock::Clock;

/// Conditional inserts attempted before an append gives up.
pub const MAX_APPEND_ATTEMPTS: usize = 5;

/// Outcome of replaying a stretch of the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntegrityReport {
    pub is_valid: bool,
    /// First record whose stored hash or back-link disagrees with the replay.
    pub first_invalid_sequence_id: Option<i64>,
    pub records_checked: usize,
}

/// Hash-chained audit log for one partition.
pub struct AuditChain {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    partition: String,
    writer: Mutex<()>,
    append_failures: AtomicU64,
}

impl std::fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditChain")
            .field("partition", &self.partition)
            .field("append_failures", &self.failure_count())
            .finish_non_exhaustive()
    }
}

impl AuditChain {
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            partition: partition.into(),
            writer: Mutex::new(()),
            append_failures: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Appends that were dropped by [`Self::record`] since startup.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.append_failures.load(Ordering::Relaxed)
    }

    /// Seal `event` onto the chain head and persist it.
    ///
    /// Appends are linearized twice: in-process by the chain's writer mutex, and
    /// across processes by the store's conditional insert, which is retried
    /// when another writer moved the head first.
    ///
    /// # Errors
    /// Storage failures, or `Conflict` once [`MAX_APPEND_ATTEMPTS`] are spent.
    #[instrument(skip(self, event), fields(partition = %self.partition, action = %event.action))]
    pub async fn append(&self, event: AuditEvent) -> Result<AuditRecord, AuditError> {
        let _writer = self.writer.lock().await;

        let mut previous_hash = self.store.head_hash(&self.partition).await?;
        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let record = event.clone().seal(self.clock.now_millis(), &previous_hash);
            match self.store.insert_linked(&self.partition, record).await? {
                LinkOutcome::Inserted(record) => {
                    debug!(sequence_id = record.sequence_id, "audit record appended");
                    return Ok(record);
                }
                LinkOutcome::Conflict { head } => {
                    warn!(attempt, "audit chain head moved, retrying");
                    previous_hash = head;
                }
            }
        }

        Err(AuditError::Conflict {
            partition: self.partition.clone(),
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }

    /// Fail-open append for business paths: errors are logged on the
    /// `pitboss::audit` target and counted, never returned.
    pub async fn record(&self, event: AuditEvent) -> Option<AuditRecord> {
        let action = event.action.clone();
        let principal = event.principal_id.clone();
        match self.append(event).await {
            Ok(record) => Some(record),
            Err(err) => {
                let failures = self.append_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    target: "pitboss::audit",
                    partition = %self.partition,
                    %action,
                    %principal,
                    failures,
                    "audit append failed: {err}"
                );
                None
            }
        }
    }

    /// Read-only operator view, newest first.
    ///
    /// # Errors
    /// Storage failures.
    pub async fn query(
        &self,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.store.query(&self.partition, filter, page).await
    }

    /// Replay `from..=to` (whole tail when `to` is `None`) and compare every
    /// stored hash with a recomputation.
    ///
    /// Verification starts from the hash of the record preceding `from`, so a
    /// sub-range is checked against the rest of the chain. The first mismatch
    /// is reported; everything after it is unverifiable.
    ///
    /// # Errors
    /// Storage failures. A broken chain is a finding, not an error.
    #[instrument(skip(self), fields(partition = %self.partition))]
    pub async fn verify_integrity(
        &self,
        from: i64,
        to: Option<i64>,
    ) -> Result<IntegrityReport, AuditError> {
        let from = from.max(1);
        let mut expected_previous = self.store.hash_before(&self.partition, from).await?;
        let records = self.store.range(&self.partition, from, to).await?;

        let mut records_checked = 0;
        for record in &records {
            records_checked += 1;
            let linked = record.previous_hash == expected_previous;
            let sealed = record.expected_hash(&expected_previous) == record.hash;
            if !(linked && sealed) {
                warn!(
                    sequence_id = record.sequence_id,
                    linked, sealed, "audit chain integrity violation"
                );
                return Ok(IntegrityReport {
                    is_valid: false,
                    first_invalid_sequence_id: Some(record.sequence_id),
                    records_checked,
                });
            }
            expected_previous.clone_from(&record.hash);
        }

        info!(records_checked, "audit chain verified");
        Ok(IntegrityReport {
            is_valid: true,
            first_invalid_sequence_id: None,
            records_checked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{store::Page, MemoryAuditStore};
    use crate::clock::ManualClock;
    use async_trait::async_trait;

    fn chain(store: Arc<MemoryAuditStore>) -> AuditChain {
        AuditChain::new(store, Arc::new(ManualClock::at_unix(1_700_000_000)), "admin")
    }

    fn event(n: usize) -> AuditEvent {
        AuditEvent::new("admin_001", "Root", "USER_BAN", "user", n.to_string())
    }

    #[tokio::test]
    async fn first_record_links_to_genesis() {
        let chain = chain(Arc::new(MemoryAuditStore::new()));
        let record = chain.append(event(1)).await.ok();
        assert_eq!(record.as_ref().map(|r| r.previous_hash.as_str()), Some(""));
        assert_eq!(record.map(|r| r.sequence_id), Some(1));
    }

    #[tokio::test]
    async fn tampering_is_reported_at_the_edited_record() {
        let store = Arc::new(MemoryAuditStore::new());
        let chain = chain(store.clone());
        for n in 1..=6 {
            let _ = chain.append(event(n)).await;
        }

        assert!(store
            .rewrite("admin", 4, |record| record.action = "USER_UNBAN".to_string())
            .await);
        let report = chain.verify_integrity(1, None).await.ok();
        assert_eq!(
            report,
            Some(IntegrityReport {
                is_valid: false,
                first_invalid_sequence_id: Some(4),
                records_checked: 4,
            })
        );

        // The prefix before the edit still verifies.
        let prefix = chain.verify_integrity(1, Some(3)).await.ok();
        assert_eq!(prefix.map(|r| r.is_valid), Some(true));
    }

    #[tokio::test]
    async fn rehashed_record_breaks_the_next_link() {
        let store = Arc::new(MemoryAuditStore::new());
        let chain = chain(store.clone());
        for n in 1..=4 {
            let _ = chain.append(event(n)).await;
        }

        // Forge record 2 consistently with its own back-link; record 3 no longer links.
        let _ = store
            .rewrite("admin", 2, |record| {
                record.resource_id = "forged".to_string();
                record.hash = record.expected_hash(&record.previous_hash);
            })
            .await;
        let report = chain.verify_integrity(1, None).await.ok();
        assert_eq!(report.and_then(|r| r.first_invalid_sequence_id), Some(3));
    }

    #[tokio::test]
    async fn sub_range_starts_from_preceding_hash() {
        let store = Arc::new(MemoryAuditStore::new());
        let chain = chain(store);
        for n in 1..=5 {
            let _ = chain.append(event(n)).await;
        }
        let report = chain.verify_integrity(3, Some(5)).await.ok();
        assert_eq!(
            report,
            Some(IntegrityReport {
                is_valid: true,
                first_invalid_sequence_id: None,
                records_checked: 3,
            })
        );
    }

    #[tokio::test]
    async fn query_returns_newest_first() {
        let chain = chain(Arc::new(MemoryAuditStore::new()));
        for n in 1..=3 {
            let _ = chain.append(event(n)).await;
        }
        let records = chain
            .query(&AuditFilter::default(), Page::default())
            .await
            .unwrap_or_default();
        let ids: Vec<i64> = records.iter().map(|r| r.sequence_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    struct BrokenStore;

    #[async_trait]
    impl AuditStore for BrokenStore {
        async fn head_hash(&self, _partition: &str) -> Result<String, AuditError> {
            Err(AuditError::Storage(sqlx::Error::PoolTimedOut))
        }

        async fn insert_linked(
            &self,
            _partition: &str,
            _record: AuditRecord,
        ) -> Result<LinkOutcome, AuditError> {
            Err(AuditError::Storage(sqlx::Error::PoolTimedOut))
        }

        async fn hash_before(&self, _partition: &str, _before: i64) -> Result<String, AuditError> {
            Err(AuditError::Storage(sqlx::Error::PoolTimedOut))
        }

        async fn range(
            &self,
            _partition: &str,
            _from: i64,
            _to: Option<i64>,
        ) -> Result<Vec<AuditRecord>, AuditError> {
            Err(AuditError::Storage(sqlx::Error::PoolTimedOut))
        }

        async fn query(
            &self,
            _partition: &str,
            _filter: &AuditFilter,
            _page: Page,
        ) -> Result<Vec<AuditRecord>, AuditError> {
            Err(AuditError::Storage(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn record_fails_open_and_counts() {
        let chain = AuditChain::new(
            Arc::new(BrokenStore),
            Arc::new(ManualClock::at_unix(0)),
            "admin",
        );
        assert!(chain.append(event(1)).await.is_err());
        assert!(chain.record(event(1)).await.is_none());
        assert!(chain.record(event(2)).await.is_none());
        assert_eq!(chain.failure_count(), 2);
    }

    /// Store whose head always moves between read and insert.
    struct RacingStore;

    #[async_trait]
    impl AuditStore for RacingStore {
        async fn head_hash(&self, _partition: &str) -> Result<String, AuditError> {
            Ok(String::new())
        }

        async fn insert_linked(
            &self,
            _partition: &str,
            record: AuditRecord,
        ) -> Result<LinkOutcome, AuditError> {
            Ok(LinkOutcome::Conflict {
                head: format!("{}x", record.previous_hash),
            })
        }

        async fn hash_before(&self, _partition: &str, _before: i64) -> Result<String, AuditError> {
            Ok(String::new())
        }

        async fn range(
            &self,
            _partition: &str,
            _from: i64,
            _to: Option<i64>,
        ) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(Vec::new())
        }

        async fn query(
            &self,
            _partition: &str,
            _filter: &AuditFilter,
            _page: Page,
        ) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn append_gives_up_after_bounded_retries() {
        let chain = AuditChain::new(
            Arc::new(RacingStore),
            Arc::new(ManualClock::at_unix(0)),
            "admin",
        );
        assert!(matches!(
            chain.append(event(1)).await,
            Err(AuditError::Conflict { attempts, .. }) if attempts == MAX_APPEND_ATTEMPTS
        ));
    }
}
