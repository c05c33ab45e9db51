use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit chain head for partition {partition} kept moving after {attempts} attempts")]
    Conflict { partition: String, attempts: usize },
}
