//! Administrative principals and the store that owns them.
//!
//! Principals are never deleted. Deactivation flips `status`; the only
//! in-service mutations are MFA enrollment and login bookkeeping.

pub mod memory;
pub mod password;
pub mod postgres;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rbac::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Active,
    Disabled,
}

impl PrincipalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    /// Anything that is not explicitly active is treated as disabled.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value.trim() {
            "active" => Self::Active,
            _ => Self::Disabled,
        }
    }
}

/// An administrative actor.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: String,
    pub account: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<SecretString>,
    pub password_hash: String,
    pub status: PrincipalStatus,
}

impl Principal {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }
}

/// Result of inserting a new principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

/// Identity persistence used by the session state machine.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_account(&self, account: &str) -> Result<Option<Principal>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>>;

    /// Persist `secret` and set `mfa_enabled` in one write.
    async fn enable_mfa(&self, id: &str, secret: &SecretString) -> Result<()>;

    /// Bookkeeping only; callers ignore failures.
    async fn record_login(&self, id: &str, at_millis: i64) -> Result<()>;

    /// Create a principal unless the id or account is already taken.
    async fn insert(&self, principal: Principal) -> Result<InsertOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_db_defaults_to_disabled() {
        assert_eq!(PrincipalStatus::from_db("active"), PrincipalStatus::Active);
        assert_eq!(PrincipalStatus::from_db(" active "), PrincipalStatus::Active);
        assert_eq!(PrincipalStatus::from_db("disabled"), PrincipalStatus::Disabled);
        assert_eq!(PrincipalStatus::from_db("banned"), PrincipalStatus::Disabled);
    }
}
