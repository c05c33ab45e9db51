use crate::{
    audit::{AuditChain, PgAuditStore},
    cli::{commands::audit::Options, globals::GlobalArgs},
    clock::SystemClock,
};
use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub options: Options,
}

/// Execute the verify-audit action; a broken chain is an error so the process exits non-zero.
/// # Errors
/// Returns an error if the store cannot be read or the chain does not verify.
pub async fn execute(args: Args) -> Result<()> {
    let Args { globals, options } = args;
    let pool = globals.connect().await?;
    let chain = AuditChain::new(
        Arc::new(PgAuditStore::new(pool)),
        Arc::new(SystemClock),
        options.partition.clone(),
    );

    let report = chain.verify_integrity(options.from, options.to).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_valid {
        info!(
            partition = %options.partition,
            records_checked = report.records_checked,
            "audit chain verified"
        );
        return Ok(());
    }

    error!(
        partition = %options.partition,
        first_invalid_sequence_id = ?report.first_invalid_sequence_id,
        "audit chain is broken"
    );
    match report.first_invalid_sequence_id {
        Some(sequence_id) => bail!(
            "audit chain {} is broken at sequence {sequence_id}",
            options.partition
        ),
        None => bail!("audit chain {} is broken", options.partition),
    }
}
