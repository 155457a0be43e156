use medicenso_core::SyncStatus;
use serde::Serialize;

use crate::commands::common::Session;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub state: String,
    pub pending: usize,
    pub failed: usize,
    pub remote_configured: bool,
    pub user_id: Option<String>,
}

pub fn status_to_item(status: SyncStatus, session: &Session) -> StatusItem {
    StatusItem {
        state: status.state.to_string(),
        pending: status.pending,
        failed: status.parked,
        remote_configured: session.remote_configured,
        user_id: session.user.as_ref().map(ToString::to_string),
    }
}

pub async fn run_status(session: &Session, as_json: bool) -> Result<(), CliError> {
    let item = status_to_item(session.repository.status().await, session);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Sync:    {}", item.state);
    println!("Pending: {}", item.pending);
    println!("Failed:  {}", item.failed);
    if !item.remote_configured {
        println!("Remote:  not configured");
    }
    println!("User:    {}", item.user_id.as_deref().unwrap_or("(none)"));
    Ok(())
}
