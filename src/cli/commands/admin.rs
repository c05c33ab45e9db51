use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::rbac::Role;

pub const NAME: &str = "create-admin";

pub const ARG_ADMIN_ID: &str = "admin-id";
pub const ARG_ACCOUNT: &str = "account";
pub const ARG_NAME: &str = "name";
pub const ARG_ROLES: &str = "roles";
pub const ARG_PASSWORD: &str = "password";

#[derive(Debug, Clone)]
pub struct Options {
    /// Generated when not supplied.
    pub admin_id: Option<String>,
    pub account: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub password: SecretString,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing or a role name is unknown.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_required = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let roles = Role::parse_list(&read_required(ARG_ROLES)?)
            .map_err(|name| anyhow!("unknown role: {name}"))?;
        if roles.is_empty() {
            return Err(anyhow!("at least one role is required"));
        }

        let account = read_required(ARG_ACCOUNT)?;
        let display_name = matches
            .get_one::<String>(ARG_NAME)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| account.clone());

        Ok(Self {
            admin_id: matches
                .get_one::<String>(ARG_ADMIN_ID)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            account,
            display_name,
            roles,
            password: SecretString::from(read_required(ARG_PASSWORD)?),
        })
    }
}

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Create an admin principal unless the account already exists")
        .arg(
            Arg::new(ARG_ADMIN_ID)
                .long(ARG_ADMIN_ID)
                .help("Principal id (default: a new UUIDv7)"),
        )
        .arg(
            Arg::new(ARG_ACCOUNT)
                .long(ARG_ACCOUNT)
                .help("Login account name")
                .required(true),
        )
        .arg(
            Arg::new(ARG_NAME)
                .long(ARG_NAME)
                .help("Display name (default: the account)"),
        )
        .arg(
            Arg::new(ARG_ROLES)
                .long(ARG_ROLES)
                .help("Comma separated roles: super_admin, admin, finance, support, operator")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Initial password")
                .env("PITBOSS_ADMIN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}
