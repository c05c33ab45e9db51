use crate::{
    audit::{actions, AuditChain, AuditEvent, PgAuditStore, DEFAULT_PARTITION},
    cli::{commands::admin::Options, globals::GlobalArgs},
    clock::SystemClock,
    identity::{
        password::hash_password, IdentityStore, InsertOutcome, PgIdentityStore, Principal,
        PrincipalStatus,
    },
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Principal recorded in the audit trail for provisioning done from the command line.
const CLI_PRINCIPAL: &str = "cli";

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub options: Options,
}

/// Build the principal to insert, hashing the password off the async runtime.
///
/// # Errors
/// Returns an error if hashing fails.
pub async fn build_principal(options: &Options) -> Result<Principal> {
    let password = SecretString::from(options.password.expose_secret().to_string());
    let password_hash = tokio::task::spawn_blocking(move || hash_password(password.expose_secret()))
        .await
        .context("password hashing task failed")??;

    Ok(Principal {
        id: options
            .admin_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string()),
        account: options.account.clone(),
        display_name: options.display_name.clone(),
        roles: options.roles.clone(),
        mfa_enabled: false,
        mfa_secret: None,
        password_hash,
        status: PrincipalStatus::Active,
    })
}

/// Execute the create-admin action.
/// # Errors
/// Returns an error if the database is unreachable or the insert fails.
pub async fn execute(args: Args) -> Result<()> {
    let principal = build_principal(&args.options).await?;
    let pool = args.globals.connect().await?;
    let store = PgIdentityStore::new(pool.clone());

    let id = principal.id.clone();
    let account = principal.account.clone();
    let roles: Vec<&str> = principal.roles.iter().map(|role| role.as_str()).collect();
    let details = json!({ "account": account, "roles": roles });

    match store.insert(principal).await? {
        InsertOutcome::Created => {
            info!(admin_id = %id, account = %account, "admin created");
            let chain = AuditChain::new(
                Arc::new(PgAuditStore::new(pool)),
                Arc::new(SystemClock),
                DEFAULT_PARTITION,
            );
            chain
                .append(
                    AuditEvent::new(
                        CLI_PRINCIPAL,
                        CLI_PRINCIPAL,
                        actions::ADMIN_CREATE,
                        "admin",
                        &id,
                    )
                    .with_details(details),
                )
                .await
                .context("admin created but the audit record could not be written")?;
            println!("created admin {account} ({id})");
        }
        InsertOutcome::AlreadyExists => {
            warn!(account = %account, "admin already exists, skipping");
            println!("admin {account} already exists, skipping");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::password::verify_password;
    use crate::rbac::Role;

    fn options(admin_id: Option<&str>) -> Options {
        Options {
            admin_id: admin_id.map(str::to_string),
            account: "ops-lead".to_string(),
            display_name: "Ops Lead".to_string(),
            roles: vec![Role::Operator],
            password: SecretString::from("correct horse battery".to_string()),
        }
    }

    #[tokio::test]
    async fn principal_gets_hashed_password_and_active_status() {
        let principal = build_principal(&options(Some("adm-1"))).await;
        assert!(principal.is_ok());
        let Ok(principal) = principal else { return };
        assert_eq!(principal.id, "adm-1");
        assert!(principal.is_active());
        assert!(!principal.mfa_enabled);
        assert_ne!(principal.password_hash, "correct horse battery");
        assert!(verify_password("correct horse battery", &principal.password_hash));
    }

    #[tokio::test]
    async fn missing_id_is_generated() {
        let first = build_principal(&options(None)).await.map(|p| p.id);
        let second = build_principal(&options(None)).await.map(|p| p.id);
        assert!(matches!((&first, &second), (Ok(a), Ok(b)) if a != b && !a.is_empty()));
    }
}
