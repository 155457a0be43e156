use crate::commands::common::{format_report_lines, report_to_list_item, ReportListItem, Session};
use crate::error::CliError;

pub async fn run_list(session: &Session, limit: usize, as_json: bool) -> Result<(), CliError> {
    let user = session.require_user()?;
    let mut reports = session.repository.get_reports(user).await?;
    reports.truncate(limit);

    if as_json {
        let json_items = reports
            .iter()
            .map(report_to_list_item)
            .collect::<Vec<ReportListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if reports.is_empty() {
        println!("No reports yet.");
    } else {
        for line in format_report_lines(&reports) {
            println!("{line}");
        }
    }

    Ok(())
}
