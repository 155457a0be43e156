use medicenso_core::ReportDraft;

use crate::commands::common::{parse_assignment, resolve_location, settle, Session};
use crate::error::CliError;

pub async fn run_add(
    session: &Session,
    location_parts: &[String],
    notes: Option<String>,
    assignments: &[String],
) -> Result<(), CliError> {
    let location = resolve_location(location_parts)?;
    let user = session.require_user()?;
    let fields = session.repository.get_fields(user).await?;

    let mut draft = ReportDraft::new(location).with_notes(notes.unwrap_or_default());
    for raw in assignments {
        if let (field_id, Some(value)) = parse_assignment(raw, &fields)? {
            draft = draft.with_value(field_id, value);
        }
    }

    let report = session.repository.save_report(draft, user).await?;
    settle(session).await?;

    println!("{}", report.id);
    Ok(())
}
