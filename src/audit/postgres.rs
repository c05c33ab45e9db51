//! Postgres-backed audit store (`admin_audit_log`).
//!
//! Appends for a partition are serialized with a transaction-scoped advisory
//! lock so separate processes cannot fork the chain.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Execute, PgPool, Postgres, QueryBuilder, Row};
use tracing::Instrument;

use super::{
    error::AuditError,
    record::{AuditRecord, GENESIS_HASH},
    store::{AuditFilter, AuditStore, LinkOutcome, Page},
};

const RECORD_COLUMNS: &str = "sequence_id, principal_id, principal_name, action, resource_type, \
     resource_id, success, source_ip, details, risk_flags, timestamp_ms, hash, previous_hash";

#[derive(Clone, Debug)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn record_from_row(row: &PgRow) -> Result<AuditRecord, sqlx::Error> {
    Ok(AuditRecord {
        sequence_id: row.try_get("sequence_id")?,
        principal_id: row.try_get("principal_id")?,
        principal_name: row.try_get("principal_name")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        success: row.try_get("success")?,
        source_ip: row.try_get("source_ip")?,
        details: row.try_get("details")?,
        risk_flags: row.try_get("risk_flags")?,
        timestamp: row.try_get("timestamp_ms")?,
        hash: row.try_get("hash")?,
        previous_hash: row.try_get("previous_hash")?,
    })
}

const HEAD_QUERY: &str = "SELECT hash FROM admin_audit_log WHERE partition = $1 \
     ORDER BY sequence_id DESC LIMIT 1";

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn head_hash(&self, partition: &str) -> Result<String, AuditError> {
        let head: Option<String> = sqlx::query_scalar(HEAD_QUERY)
            .bind(partition)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", HEAD_QUERY))
            .await?;
        Ok(head.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    async fn insert_linked(
        &self,
        partition: &str,
        record: AuditRecord,
    ) -> Result<LinkOutcome, AuditError> {
        let mut tx = self.pool.begin().await?;

        let lock = "SELECT pg_advisory_xact_lock(hashtext($1)::bigint)";
        sqlx::query(lock)
            .bind(partition)
            .execute(&mut *tx)
            .instrument(db_span("SELECT", lock))
            .await?;

        let head: Option<String> = sqlx::query_scalar(HEAD_QUERY)
            .bind(partition)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", HEAD_QUERY))
            .await?;
        let head = head.unwrap_or_else(|| GENESIS_HASH.to_string());
        if head != record.previous_hash {
            tx.rollback().await?;
            return Ok(LinkOutcome::Conflict { head });
        }

        let insert = r"
            INSERT INTO admin_audit_log
                (partition, principal_id, principal_name, action, resource_type, resource_id,
                 success, source_ip, details, risk_flags, timestamp_ms, hash, previous_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING sequence_id
        ";
        let sequence_id: i64 = sqlx::query_scalar(insert)
            .bind(partition)
            .bind(&record.principal_id)
            .bind(&record.principal_name)
            .bind(&record.action)
            .bind(&record.resource_type)
            .bind(&record.resource_id)
            .bind(record.success)
            .bind(&record.source_ip)
            .bind(&record.details)
            .bind(&record.risk_flags)
            .bind(record.timestamp)
            .bind(&record.hash)
            .bind(&record.previous_hash)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", insert))
            .await?;

        tx.commit().await?;

        Ok(LinkOutcome::Inserted(AuditRecord {
            sequence_id,
            ..record
        }))
    }

    async fn hash_before(&self, partition: &str, before: i64) -> Result<String, AuditError> {
        let query = "SELECT hash FROM admin_audit_log WHERE partition = $1 AND sequence_id < $2 \
                     ORDER BY sequence_id DESC LIMIT 1";
        let hash: Option<String> = sqlx::query_scalar(query)
            .bind(partition)
            .bind(before)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(hash.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    async fn range(
        &self,
        partition: &str,
        from: i64,
        to: Option<i64>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM admin_audit_log \
             WHERE partition = $1 AND sequence_id >= $2 AND ($3::bigint IS NULL OR sequence_id <= $3) \
             ORDER BY sequence_id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(partition)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn query(
        &self,
        partition: &str,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM admin_audit_log WHERE partition = "
        ));
        builder.push_bind(partition);

        for (column, value) in [
            ("principal_id", &filter.principal_id),
            ("action", &filter.action),
            ("resource_type", &filter.resource_type),
            ("resource_id", &filter.resource_id),
        ] {
            if let Some(value) = value {
                builder.push(format!(" AND {column} = ")).push_bind(value.as_str());
            }
        }
        if let Some(start) = filter.start_time {
            builder.push(" AND timestamp_ms >= ").push_bind(start);
        }
        if let Some(end) = filter.end_time {
            builder.push(" AND timestamp_ms <= ").push_bind(end);
        }

        builder
            .push(" ORDER BY sequence_id DESC LIMIT ")
            .push_bind(i64::from(page.size()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let query = builder.build();
        let statement = query.sql().to_string();
        let rows = query
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &statement))
            .await?;
        Ok(rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
