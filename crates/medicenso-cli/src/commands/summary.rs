use serde::Serialize;

use crate::commands::common::Session;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SummaryItem {
    total_reports: usize,
    total_population: f64,
}

pub async fn run_summary(session: &Session, as_json: bool) -> Result<(), CliError> {
    if let Some(user) = session.user.as_ref() {
        // Seeds a cold cache when online.
        session.repository.get_reports(user).await?;
    }
    let summary = session.repository.summary().await;

    if as_json {
        let item = SummaryItem {
            total_reports: summary.total_reports,
            total_population: summary.total_population,
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Reports:    {}", summary.total_reports);
        println!("Population: {}", summary.total_population);
    }
    Ok(())
}
