use crate::{
    api::{self, AppState, DatabaseProbe},
    audit::{AuditChain, PgAuditStore},
    cli::{commands::server::Options, globals::GlobalArgs},
    clock::{Clock, SystemClock},
    identity::PgIdentityStore,
    rbac::RolePermissionMap,
    session::{AuthConfig, Authenticator, NoopChallengeLedger, TokenSigner},
    totp::{Totp, TotpConfig},
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub options: Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database is unreachable,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);
    let Args { globals, options } = args;

    let permissions = RolePermissionMap::standard();
    permissions
        .validate()
        .context("Role permission table is incomplete")?;

    let signer = TokenSigner::new(options.token_secret.expose_secret().as_bytes())
        .context("Invalid --token-secret")?;

    let totp = Totp::new(
        TotpConfig::new()
            .with_time_step(options.totp_step_seconds)
            .with_window(options.totp_window),
    );

    let auth_config = AuthConfig::new()
        .with_session_ttl(options.session_ttl_seconds)
        .with_challenge_ttl(options.challenge_ttl_seconds)
        .with_totp_issuer(options.totp_issuer.clone());

    let pool = globals.connect().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut authenticator = Authenticator::new(
        Arc::new(PgIdentityStore::new(pool.clone())),
        Arc::new(permissions),
        signer,
        totp,
        auth_config,
        Arc::clone(&clock),
    );
    if !options.mfa_single_use {
        authenticator = authenticator.with_challenge_ledger(Arc::new(NoopChallengeLedger));
    }

    let audit = AuditChain::new(
        Arc::new(PgAuditStore::new(pool.clone())),
        clock,
        options.audit_partition.clone(),
    );

    let state = AppState {
        auth: Arc::new(authenticator),
        audit: Arc::new(audit),
        database: DatabaseProbe::Postgres(pool),
    };

    api::new(options.port, state, options.cors_origin.as_deref()).await
}

fn log_startup_args(args: &Args) {
    let options = &args.options;
    let entries = [
        ("listen", format!("tcp:{}", options.port)),
        ("dsn", args.globals.redacted_dsn()),
        ("session_ttl_seconds", options.session_ttl_seconds.to_string()),
        (
            "challenge_ttl_seconds",
            options.challenge_ttl_seconds.to_string(),
        ),
        ("totp_issuer", options.totp_issuer.clone()),
        ("totp_window", options.totp_window.to_string()),
        ("totp_step_seconds", options.totp_step_seconds.to_string()),
        ("audit_partition", options.audit_partition.clone()),
        ("mfa_single_use", options.mfa_single_use.to_string()),
        (
            "cors_origin",
            options
                .cors_origin
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );
    for (key, value) in entries {
        message.push_str(&format!("\n  {key:<max_key_len$}  {value}"));
    }
    info!("{message}");
}
