use medicenso_core::DrainOutcome;

use crate::commands::common::{format_timestamp, Session};
use crate::error::CliError;

pub async fn run_sync(session: &Session) -> Result<(), CliError> {
    if !session.remote_configured {
        println!(
            "No remote store configured; {} change(s) stay queued on this device.",
            session.repository.pending_count().await
        );
        return Ok(());
    }

    match session.repository.sync_now().await? {
        DrainOutcome::Offline => println!("Offline; nothing was sent."),
        DrainOutcome::Busy => println!("A sync is already running."),
        DrainOutcome::Idle => println!("Nothing to sync."),
        DrainOutcome::Drained(report) => {
            println!("Sent {} change(s)", report.applied);
            if report.parked > 0 {
                println!(
                    "Set aside {} unrecoverable change(s); see `medicenso sync --show-failed`",
                    report.parked
                );
            }
            if report.halted {
                println!(
                    "Sync stopped at a remote failure; {} change(s) remain queued",
                    report.remaining
                );
            }
        }
    }
    Ok(())
}

pub async fn run_show_failed(session: &Session) -> Result<(), CliError> {
    let parked = session.repository.failed_operations().await;
    if parked.is_empty() {
        println!("No failed operations recorded.");
        return Ok(());
    }

    for entry in &parked {
        println!(
            "{}  {}  {}",
            format_timestamp(entry.parked_at),
            entry.operation.describe(),
            entry.reason
        );
    }
    Ok(())
}

pub async fn run_clear_failed(session: &Session) -> Result<(), CliError> {
    let cleared = session.repository.clear_failed_operations().await?;
    println!("Cleared {cleared} failed operation(s)");
    Ok(())
}
