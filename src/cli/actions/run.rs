use crate::cli::actions::{admin, audit, server, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::CreateAdmin(args) => admin::execute(args).await,
        Action::VerifyAudit(args) => audit::execute(args).await,
    }
}
