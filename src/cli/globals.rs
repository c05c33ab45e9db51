use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use url::Url;

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub dsn: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(dsn: SecretString) -> Self {
        Self { dsn }
    }

    /// Open the Postgres pool used by the stores.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(&self) -> Result<PgPool> {
        PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(self.dsn.expose_secret())
            .await
            .with_context(|| format!("Failed to connect to database {}", self.redacted_dsn()))
    }

    /// The DSN with any password replaced, safe for logs.
    #[must_use]
    pub fn redacted_dsn(&self) -> String {
        match Url::parse(self.dsn.expose_secret()) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("REDACTED"));
                }
                parsed.to_string()
            }
            Err(_) => "invalid-dsn".to_string(),
        }
    }
}
