use std::path::PathBuf;

use clap::{Parser, Subcommand};
use medicenso_core::FieldType;

#[derive(Parser)]
#[command(name = "medicenso")]
#[command(about = "Record field census reports offline and sync them when connected")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the device database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name holding the remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Work offline: changes are queued but never sent
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a new census report
    #[command(alias = "new")]
    Add {
        /// Location surveyed
        #[arg(required = true)]
        location: Vec<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Field value as <field-id>=<value>
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        values: Vec<String>,
    },
    /// List reports, newest first
    List {
        /// Number of reports to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one report
    Show {
        /// Report ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing report
    Edit {
        /// Report ID or unique ID prefix
        id: String,
        /// New location
        #[arg(long)]
        location: Option<String>,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
        /// Field value as <field-id>=<value>; an empty value clears it
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        values: Vec<String>,
    },
    /// Delete a report
    Delete {
        /// Report ID or unique ID prefix
        id: String,
    },
    /// Manage census form fields
    Fields {
        #[command(subcommand)]
        command: FieldsCommands,
    },
    /// Send queued changes to the remote store now
    Sync {
        /// List operations that were set aside as unrecoverable
        #[arg(long)]
        show_failed: bool,
        /// Forget operations that were set aside as unrecoverable
        #[arg(long, conflicts_with = "show_failed")]
        clear_failed: bool,
    },
    /// Show the sync indicator and queue counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report totals for the dashboard header
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload data left by the local-only version of the app
    Migrate,
    /// Keep syncing in the background until Ctrl-C
    Watch {
        /// Seconds between periodic drains
        #[arg(long, value_name = "SECONDS")]
        interval: Option<u64>,
    },
    /// Manage CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum FieldsCommands {
    /// List the field set
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Append a custom field
    Add {
        /// Display label
        #[arg(required = true)]
        label: Vec<String>,
        /// Value type: number, text or boolean
        #[arg(long = "type", default_value = "number")]
        value_type: FieldType,
    },
    /// Flip whether a field appears in new forms
    Toggle {
        /// Field ID
        id: String,
    },
    /// Remove a field from the set
    Remove {
        /// Field ID
        id: String,
        /// Remove even when existing reports hold values for it
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the profile chosen by --profile
    Init {
        /// Supabase project URL
        #[arg(long)]
        supabase_url: Option<String>,
        /// Supabase anonymous API key
        #[arg(long)]
        supabase_anon_key: Option<String>,
        /// Census user the device records reports for
        #[arg(long)]
        user_id: Option<String>,
        /// Keep the current active profile
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show,
}
