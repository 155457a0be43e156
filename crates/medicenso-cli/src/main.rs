//! MediCenso CLI - record census reports from the terminal
//!
//! Reports are saved on the device first and synced in the background.

mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{open_session, resolve_db_path};
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::fields::run_fields;
use crate::commands::list::run_list;
use crate::commands::migrate::run_migrate;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::summary::run_summary;
use crate::commands::sync::{run_clear_failed, run_show_failed, run_sync};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("medicenso=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        command,
        db_path,
        profile,
        offline,
    } = Cli::parse();

    let command = match command {
        Commands::Config { command } => return run_config(command, profile.as_deref()),
        command => command,
    };

    let db_path = resolve_db_path(db_path)?;
    let session = open_session(&db_path, profile.as_deref(), offline).await?;

    match command {
        Commands::Add {
            location,
            notes,
            values,
        } => run_add(&session, &location, notes, &values).await?,
        Commands::List { limit, json } => run_list(&session, limit, json).await?,
        Commands::Show { id, json } => run_show(&session, &id, json).await?,
        Commands::Edit {
            id,
            location,
            notes,
            values,
        } => run_edit(&session, &id, location, notes, &values).await?,
        Commands::Delete { id } => run_delete(&session, &id).await?,
        Commands::Fields { command } => run_fields(&session, command).await?,
        Commands::Sync {
            show_failed,
            clear_failed,
        } => {
            if show_failed {
                run_show_failed(&session).await?;
            } else if clear_failed {
                run_clear_failed(&session).await?;
            } else {
                run_sync(&session).await?;
            }
        }
        Commands::Status { json } => run_status(&session, json).await?,
        Commands::Summary { json } => run_summary(&session, json).await?,
        Commands::Migrate => run_migrate(&session).await?,
        Commands::Watch { interval } => run_watch(&session, interval).await?,
        Commands::Config { .. } => unreachable!("handled before opening the session"),
    }

    Ok(())
}
