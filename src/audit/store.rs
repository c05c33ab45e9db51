//! Persistence contract for audit chains.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{error::AuditError, record::AuditRecord};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Result of a conditional append.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkOutcome {
    /// Persisted with a freshly assigned `sequence_id`.
    Inserted(AuditRecord),
    /// The partition head is no longer the record's `previous_hash`.
    Conflict { head: String },
}

/// Operator filters for [`AuditStore::query`]. Times are Unix milliseconds, inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditFilter {
    pub principal_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl AuditFilter {
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        fn eq(filter: Option<&String>, value: &str) -> bool {
            filter.map_or(true, |expected| expected == value)
        }

        eq(self.principal_id.as_ref(), &record.principal_id)
            && eq(self.action.as_ref(), &record.action)
            && eq(self.resource_type.as_ref(), &record.resource_type)
            && eq(self.resource_id.as_ref(), &record.resource_id)
            && self.start_time.map_or(true, |start| record.timestamp >= start)
            && self.end_time.map_or(true, |end| record.timestamp <= end)
    }
}

/// 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    /// Page numbers below 1 become 1; sizes are clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Append-only audit persistence. Records of one partition are ordered by
/// `sequence_id`; ids are unique across partitions but not contiguous.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Hash of the newest record in `partition`, or the genesis value.
    async fn head_hash(&self, partition: &str) -> Result<String, AuditError>;

    /// Persist `record` only if the partition head still equals
    /// `record.previous_hash`. Check and insert are atomic.
    async fn insert_linked(
        &self,
        partition: &str,
        record: AuditRecord,
    ) -> Result<LinkOutcome, AuditError>;

    /// Hash of the newest record with `sequence_id < before`, or the genesis value.
    async fn hash_before(&self, partition: &str, before: i64) -> Result<String, AuditError>;

    /// Records with `from <= sequence_id <= to`, ascending.
    async fn range(
        &self,
        partition: &str,
        from: i64,
        to: Option<i64>,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    /// Filtered records, newest first.
    async fn query(
        &self,
        partition: &str,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditRecord>, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;

    #[test]
    fn page_is_clamped() {
        assert_eq!(Page::new(0, 0), Page::new(1, 1));
        assert_eq!(Page::new(3, 10_000).size(), MAX_PAGE_SIZE);
        assert_eq!(Page::new(3, 20).offset(), 40);
        assert_eq!(Page::default().size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn filter_matches_every_given_field() {
        let record = AuditEvent::new("admin_001", "Root", "USER_BAN", "user", "42").seal(1_000, "");
        assert!(AuditFilter::default().matches(&record));

        let filter = AuditFilter {
            principal_id: Some("admin_001".to_string()),
            action: Some("USER_BAN".to_string()),
            start_time: Some(1_000),
            end_time: Some(1_000),
            ..AuditFilter::default()
        };
        assert!(filter.matches(&record));

        let other_action = AuditFilter {
            action: Some("USER_KICK".to_string()),
            ..AuditFilter::default()
        };
        assert!(!other_action.matches(&record));

        let too_late = AuditFilter {
            start_time: Some(1_001),
            ..AuditFilter::default()
        };
        assert!(!too_late.matches(&record));
    }
}
