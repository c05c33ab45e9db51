use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::{audit::DEFAULT_PARTITION, session, totp};

pub const NAME: &str = "server";

pub const ARG_PORT: &str = "port";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_SESSION_TTL: &str = "session-ttl";
pub const ARG_CHALLENGE_TTL: &str = "challenge-ttl";
pub const ARG_TOTP_ISSUER: &str = "totp-issuer";
pub const ARG_TOTP_WINDOW: &str = "totp-window";
pub const ARG_TOTP_STEP: &str = "totp-step";
pub const ARG_AUDIT_PARTITION: &str = "audit-partition";
pub const ARG_MFA_SINGLE_USE: &str = "mfa-single-use";
pub const ARG_CORS_ORIGIN: &str = "cors-origin";

#[derive(Debug, Clone)]
pub struct Options {
    pub port: u16,
    pub token_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub challenge_ttl_seconds: i64,
    pub totp_issuer: String,
    pub totp_window: u64,
    pub totp_step_seconds: u64,
    pub audit_partition: String,
    pub mfa_single_use: bool,
    pub cors_origin: Option<String>,
}

impl Options {
    /// Parse server arguments from the `server` subcommand matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_required = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(7011),
            token_secret: SecretString::from(read_required(ARG_TOKEN_SECRET)?),
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL)
                .copied()
                .unwrap_or(session::DEFAULT_SESSION_TTL_SECONDS),
            challenge_ttl_seconds: matches
                .get_one::<i64>(ARG_CHALLENGE_TTL)
                .copied()
                .unwrap_or(session::DEFAULT_CHALLENGE_TTL_SECONDS),
            totp_issuer: read_required(ARG_TOTP_ISSUER)?,
            totp_window: matches
                .get_one::<u64>(ARG_TOTP_WINDOW)
                .copied()
                .unwrap_or(totp::DEFAULT_WINDOW),
            totp_step_seconds: matches
                .get_one::<u64>(ARG_TOTP_STEP)
                .copied()
                .unwrap_or(totp::DEFAULT_TIME_STEP_SECONDS),
            audit_partition: read_required(ARG_AUDIT_PARTITION)?,
            mfa_single_use: matches
                .get_one::<bool>(ARG_MFA_SINGLE_USE)
                .copied()
                .unwrap_or(true),
            cors_origin: matches
                .get_one::<String>(ARG_CORS_ORIGIN)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

#[must_use]
pub fn command() -> Command {
    let command = Command::new(NAME)
        .about("Run the admin API server")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("7011")
                .env("PITBOSS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC key used to sign session and challenge tokens (at least 32 bytes)")
                .env("PITBOSS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CORS_ORIGIN)
                .long(ARG_CORS_ORIGIN)
                .help("Dashboard origin allowed by CORS")
                .env("PITBOSS_CORS_ORIGIN"),
        );

    let command = with_session_args(command);
    with_audit_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session token TTL in seconds")
                .env("PITBOSS_SESSION_TTL")
                .default_value("28800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CHALLENGE_TTL)
                .long(ARG_CHALLENGE_TTL)
                .help("MFA challenge token TTL in seconds")
                .env("PITBOSS_CHALLENGE_TTL")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer shown by authenticator apps")
                .env("PITBOSS_TOTP_ISSUER")
                .default_value(session::DEFAULT_TOTP_ISSUER),
        )
        .arg(
            Arg::new(ARG_TOTP_WINDOW)
                .long(ARG_TOTP_WINDOW)
                .help("Accepted TOTP clock drift, in time steps either side")
                .env("PITBOSS_TOTP_WINDOW")
                .default_value("1")
                .value_parser(clap::value_parser!(u64).range(0..=10)),
        )
        .arg(
            Arg::new(ARG_TOTP_STEP)
                .long(ARG_TOTP_STEP)
                .help("TOTP time step in seconds")
                .env("PITBOSS_TOTP_STEP")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MFA_SINGLE_USE)
                .long(ARG_MFA_SINGLE_USE)
                .help("Reject a second redemption of the same MFA challenge")
                .env("PITBOSS_MFA_SINGLE_USE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}

fn with_audit_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_AUDIT_PARTITION)
            .long(ARG_AUDIT_PARTITION)
            .help("Audit chain partition written by this server")
            .env("PITBOSS_AUDIT_PARTITION")
            .default_value(DEFAULT_PARTITION),
    )
}
