//! Postgres-backed identity store (`admin_users`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{warn, Instrument};

use super::{IdentityStore, InsertOutcome, Principal, PrincipalStatus};
use crate::rbac::Role;

const SELECT_COLUMNS: &str = "admin_id, account, display_name, password_hash, roles, \
     mfa_enabled, mfa_secret, status";

#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Principal>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM admin_users WHERE {column} = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to lookup principal by {column}"))?;

        row.map(|row| principal_from_row(&row)).transpose()
    }
}

fn principal_from_row(row: &PgRow) -> Result<Principal> {
    let id: String = row.try_get("admin_id")?;
    let role_names: Vec<String> = row.try_get("roles")?;
    let roles = role_names
        .iter()
        .filter_map(|name| {
            let role = Role::parse(name);
            if role.is_none() {
                warn!(principal = %id, role = %name, "ignoring unknown role");
            }
            role
        })
        .collect();
    let mfa_secret: Option<String> = row.try_get("mfa_secret")?;
    let status: String = row.try_get("status")?;

    Ok(Principal {
        account: row.try_get("account")?,
        display_name: row.try_get("display_name")?,
        password_hash: row.try_get("password_hash")?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        mfa_secret: mfa_secret.map(SecretString::from),
        status: PrincipalStatus::from_db(&status),
        roles,
        id,
    })
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_account(&self, account: &str) -> Result<Option<Principal>> {
        self.fetch_one_by("account", account).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>> {
        self.fetch_one_by("admin_id", id).await
    }

    async fn enable_mfa(&self, id: &str, secret: &SecretString) -> Result<()> {
        let query = "UPDATE admin_users SET mfa_secret = $1, mfa_enabled = TRUE WHERE admin_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(secret.expose_secret())
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to enable MFA")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("principal {id} not found"));
        }
        Ok(())
    }

    async fn record_login(&self, id: &str, at_millis: i64) -> Result<()> {
        let query = "UPDATE admin_users SET last_login_at = to_timestamp($1::float8 / 1000) \
                     WHERE admin_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(at_millis)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login")?;
        Ok(())
    }

    async fn insert(&self, principal: Principal) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO admin_users
                (admin_id, account, display_name, password_hash, roles, mfa_enabled, mfa_secret, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let roles: Vec<String> = principal
            .roles
            .iter()
            .map(|role| role.as_str().to_string())
            .collect();
        let result = sqlx::query(query)
            .bind(&principal.id)
            .bind(&principal.account)
            .bind(&principal.display_name)
            .bind(&principal.password_hash)
            .bind(roles)
            .bind(principal.mfa_enabled)
            .bind(
                principal
                    .mfa_secret
                    .as_ref()
                    .map(|secret| secret.expose_secret().to_string()),
            )
            .bind(principal.status.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert principal")?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Created)
        }
    }
}
