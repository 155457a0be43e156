use crate::commands::common::{normalize_report_identifier, resolve_report, settle, Session};
use crate::error::CliError;

pub async fn run_delete(session: &Session, id: &str) -> Result<(), CliError> {
    let query = normalize_report_identifier(id)?;
    let report = resolve_report(&query, &session.repository).await?;

    session.repository.delete_report(&report.id).await?;
    settle(session).await?;
    println!("{}", report.id);
    Ok(())
}
