//! Tamper-evident audit trail.
//!
//! Each record's hash covers `principalId`, `action`, `resourceType`,
//! `resourceId`, `timestamp` and the previous record's hash, so editing or
//! removing a record breaks every link after it. Records are never updated or
//! deleted; the only mutation is append.

pub mod chain;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use chain::{AuditChain, IntegrityReport};
pub use error::AuditError;
pub use memory::MemoryAuditStore;
pub use postgres::PgAuditStore;
pub use record::{chain_hash, AuditEvent, AuditRecord, GENESIS_HASH};
pub use store::{AuditFilter, AuditStore, LinkOutcome, Page};

/// Action names written by the authentication endpoints and the CLI.
pub mod actions {
    pub const ADMIN_LOGIN: &str = "ADMIN_LOGIN";
    pub const ADMIN_MFA_VERIFY: &str = "ADMIN_MFA_VERIFY";
    pub const ADMIN_MFA_ENABLE: &str = "ADMIN_MFA_ENABLE";
    pub const ADMIN_CREATE: &str = "ADMIN_CREATE";
}

pub const DEFAULT_PARTITION: &str = "admin";
