//! Map validated CLI arguments to the action the binary will run.

use crate::cli::{
    actions::{admin, audit, server, Action},
    commands::{self, ARG_DSN},
    globals::GlobalArgs,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty())
        .context("missing required argument: --dsn")?;
    let globals = GlobalArgs::new(SecretString::from(dsn));

    match matches.subcommand() {
        Some((commands::server::NAME, sub)) => Ok(Action::Server(server::Args {
            globals,
            options: commands::server::Options::parse(sub)?,
        })),
        Some((commands::admin::NAME, sub)) => Ok(Action::CreateAdmin(admin::Args {
            globals,
            options: commands::admin::Options::parse(sub)?,
        })),
        Some((commands::audit::NAME, sub)) => Ok(Action::VerifyAudit(audit::Args {
            globals,
            options: commands::audit::Options::parse(sub)?,
        })),
        Some((other, _)) => Err(anyhow!("unknown subcommand: {other}")),
        None => Err(anyhow!("missing subcommand")),
    }
}
