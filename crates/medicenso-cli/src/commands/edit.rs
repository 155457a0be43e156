use medicenso_core::models::default_fields;

use crate::commands::common::{
    normalize_report_identifier, parse_assignment, resolve_report, settle, Session,
};
use crate::error::CliError;

pub async fn run_edit(
    session: &Session,
    id: &str,
    location: Option<String>,
    notes: Option<String>,
    assignments: &[String],
) -> Result<(), CliError> {
    let query = normalize_report_identifier(id)?;
    let original = resolve_report(&query, &session.repository).await?;

    let fields = match session.user.as_ref() {
        Some(user) => session.repository.get_fields(user).await?,
        None => default_fields(),
    };

    let mut report = original.clone();
    if let Some(location) = location {
        report.location = location;
    }
    if let Some(notes) = notes {
        report.notes = notes.trim().to_string();
    }
    for raw in assignments {
        match parse_assignment(raw, &fields)? {
            (field_id, Some(value)) => {
                report.data.insert(field_id, value);
            }
            (field_id, None) => {
                report.data.remove(&field_id);
            }
        }
    }

    if report == original {
        println!("{}", report.id);
        return Ok(());
    }

    let updated = session.repository.update_report(report).await?;
    settle(session).await?;
    println!("{}", updated.id);
    Ok(())
}
