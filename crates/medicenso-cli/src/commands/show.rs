use medicenso_core::models::default_fields;

use crate::commands::common::{
    format_report_detail, normalize_report_identifier, resolve_report, Session,
};
use crate::error::CliError;

pub async fn run_show(session: &Session, id: &str, as_json: bool) -> Result<(), CliError> {
    let query = normalize_report_identifier(id)?;
    let report = resolve_report(&query, &session.repository).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let fields = match session.user.as_ref() {
        Some(user) => session.repository.get_fields(user).await?,
        None => default_fields(),
    };
    for line in format_report_detail(&report, &fields) {
        println!("{line}");
    }
    Ok(())
}
