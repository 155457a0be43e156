use std::time::Duration;

use crate::commands::common::Session;
use crate::error::CliError;

/// Run the background engine until Ctrl-C.
pub async fn run_watch(session: &Session, interval_secs: Option<u64>) -> Result<(), CliError> {
    let interval = interval_secs
        .filter(|secs| *secs > 0)
        .map_or(session.sync.interval, Duration::from_secs);

    if !session.is_online() {
        println!("Offline; queued changes will wait until a remote store is reachable.");
    }
    let engine = session.repository.engine().clone();
    engine.trigger();
    let background = engine.spawn_background(interval);
    tracing::info!("Watching for queued changes every {}s", interval.as_secs());

    tokio::signal::ctrl_c().await?;
    background.abort();

    let status = session.repository.status().await;
    println!("Stopped; {} change(s) pending", status.pending);
    Ok(())
}
