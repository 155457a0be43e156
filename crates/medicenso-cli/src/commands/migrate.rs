use medicenso_core::migrate_to_supabase;

use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_migrate(session: &Session) -> Result<(), CliError> {
    let user = session.require_user()?;
    let migrated = migrate_to_supabase(&session.repository, user).await?;

    if migrated.is_empty() {
        println!("No local-only data to migrate.");
    } else {
        println!(
            "Migrated {} report(s) and {} field(s)",
            migrated.reports, migrated.fields
        );
    }
    Ok(())
}
