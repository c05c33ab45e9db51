use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use crate::audit::DEFAULT_PARTITION;

pub const NAME: &str = "verify-audit";

pub const ARG_PARTITION: &str = "partition";
pub const ARG_FROM: &str = "from";
pub const ARG_TO: &str = "to";

#[derive(Debug, Clone)]
pub struct Options {
    pub partition: String,
    pub from: i64,
    pub to: Option<i64>,
}

impl Options {
    /// # Errors
    /// Returns an error if the range is inverted.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let from = matches.get_one::<i64>(ARG_FROM).copied().unwrap_or(1);
        let to = matches.get_one::<i64>(ARG_TO).copied();
        if let Some(to) = to {
            anyhow::ensure!(to >= from, "--{ARG_TO} ({to}) is before --{ARG_FROM} ({from})");
        }

        Ok(Self {
            partition: matches
                .get_one::<String>(ARG_PARTITION)
                .cloned()
                .unwrap_or_else(|| DEFAULT_PARTITION.to_string()),
            from,
            to,
        })
    }
}

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Recompute the audit hash chain and exit non-zero if it is broken")
        .arg(
            Arg::new(ARG_PARTITION)
                .long(ARG_PARTITION)
                .help("Audit chain partition")
                .env("PITBOSS_AUDIT_PARTITION")
                .default_value(DEFAULT_PARTITION),
        )
        .arg(
            Arg::new(ARG_FROM)
                .long(ARG_FROM)
                .help("First sequence id to check")
                .default_value("1")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TO)
                .long(ARG_TO)
                .help("Last sequence id to check (default: the head)")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}
