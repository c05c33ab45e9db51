//! In-process identity store.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{IdentityStore, InsertOutcome, Principal};

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    principals: RwLock<HashMap<String, Principal>>,
    last_login: RwLock<HashMap<String, i64>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_login(&self, id: &str) -> Option<i64> {
        self.last_login.read().await.get(id).copied()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_account(&self, account: &str) -> Result<Option<Principal>> {
        let principals = self.principals.read().await;
        Ok(principals
            .values()
            .find(|principal| principal.account == account)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>> {
        Ok(self.principals.read().await.get(id).cloned())
    }

    async fn enable_mfa(&self, id: &str, secret: &SecretString) -> Result<()> {
        let mut principals = self.principals.write().await;
        let principal = principals
            .get_mut(id)
            .ok_or_else(|| anyhow!("principal {id} not found"))?;
        principal.mfa_secret = Some(secret.clone());
        principal.mfa_enabled = true;
        Ok(())
    }

    async fn record_login(&self, id: &str, at_millis: i64) -> Result<()> {
        self.last_login
            .write()
            .await
            .insert(id.to_string(), at_millis);
        Ok(())
    }

    async fn insert(&self, principal: Principal) -> Result<InsertOutcome> {
        let mut principals = self.principals.write().await;
        let taken = principals.contains_key(&principal.id)
            || principals
                .values()
                .any(|existing| existing.account == principal.account);
        if taken {
            return Ok(InsertOutcome::AlreadyExists);
        }
        principals.insert(principal.id.clone(), principal);
        Ok(InsertOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrincipalStatus;
    use crate::rbac::Role;
    use secrecy::ExposeSecret;

    fn principal(id: &str, account: &str) -> Principal {
        Principal {
            id: id.to_string(),
            account: account.to_string(),
            display_name: account.to_string(),
            roles: vec![Role::Support],
            mfa_enabled: false,
            mfa_secret: None,
            password_hash: String::new(),
            status: PrincipalStatus::Active,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id_or_account() {
        let store = MemoryIdentityStore::new();
        assert_eq!(
            store.insert(principal("a1", "alice")).await.ok(),
            Some(InsertOutcome::Created)
        );
        assert_eq!(
            store.insert(principal("a1", "other")).await.ok(),
            Some(InsertOutcome::AlreadyExists)
        );
        assert_eq!(
            store.insert(principal("a2", "alice")).await.ok(),
            Some(InsertOutcome::AlreadyExists)
        );
    }

    #[tokio::test]
    async fn enable_mfa_sets_secret_and_flag() {
        let store = MemoryIdentityStore::new();
        let _ = store.insert(principal("a1", "alice")).await;
        let secret = SecretString::from("JBSWY3DPEHPK3PXP".to_string());
        assert!(store.enable_mfa("a1", &secret).await.is_ok());

        let stored = store.find_by_account("alice").await.ok().flatten();
        assert_eq!(stored.as_ref().map(|p| p.mfa_enabled), Some(true));
        assert_eq!(
            stored
                .and_then(|p| p.mfa_secret)
                .map(|s| s.expose_secret().to_string()),
            Some("JBSWY3DPEHPK3PXP".to_string())
        );
        assert!(store.enable_mfa("missing", &secret).await.is_err());
    }
}
