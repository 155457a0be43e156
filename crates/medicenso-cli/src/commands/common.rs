use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use medicenso_core::config::{RemoteConfig, SyncConfig};
use medicenso_core::ids;
use medicenso_core::remote::{DisconnectedRemoteStore, RemoteStore, SupabaseRemoteStore};
use medicenso_core::storage::DeviceStorage;
use medicenso_core::util::normalize_text_option;
use medicenso_core::{
    Connectivity, DrainOutcome, FieldDefinition, FieldValue, Report, ReportRepository, UserId,
};
use serde::Serialize;

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

const DB_PATH_ENV: &str = "MEDICENSO_DB_PATH";
const USER_ID_ENV: &str = "MEDICENSO_USER_ID";
const ACCESS_TOKEN_ENV: &str = "MEDICENSO_ACCESS_TOKEN";

/// Everything a command needs: the façade and who is recording.
pub struct Session {
    pub repository: ReportRepository,
    pub user: Option<UserId>,
    pub sync: SyncConfig,
    pub remote_configured: bool,
}

impl Session {
    pub fn require_user(&self) -> Result<&UserId, CliError> {
        self.user.as_ref().ok_or(CliError::NotAuthenticated)
    }

    pub fn is_online(&self) -> bool {
        self.repository.connectivity().is_online()
    }
}

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub relative_time: String,
    pub notes: String,
    pub values: usize,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("medicenso").join("medicenso.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Open the device database and wire the façade to the configured remote.
///
/// Without a remote configuration the session runs offline against a
/// disconnected store, so every change stays queued.
pub async fn open_session(
    db_path: &Path,
    profile_name: Option<&str>,
    offline: bool,
) -> Result<Session, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&profile_name);

    let sync = SyncConfig::default();
    let remote_config = resolve_remote_config(profile)?;
    let remote_configured = remote_config.is_some();
    let remote: Arc<dyn RemoteStore> = match remote_config {
        Some(remote_config) => {
            tracing::debug!("Using remote store from profile '{profile_name}'");
            Arc::new(SupabaseRemoteStore::new(remote_config, sync.request_timeout)?)
        }
        None => Arc::new(DisconnectedRemoteStore),
    };
    let user = resolve_user(profile, env::var(USER_ID_ENV).ok())?;
    if remote_configured && user.is_none() {
        tracing::warn!("No user id configured; working offline");
    }

    let storage = DeviceStorage::open_path(db_path).await?;
    Ok(assemble_session(
        storage,
        remote,
        SessionOptions {
            remote_configured,
            offline,
            sync,
        },
        user,
    ))
}

pub struct SessionOptions {
    pub remote_configured: bool,
    pub offline: bool,
    pub sync: SyncConfig,
}

/// Wire storage and remote into a session.
///
/// The remote store is never called without a user id, so a session with
/// no user starts offline even when a remote is configured.
pub fn assemble_session(
    storage: DeviceStorage,
    remote: Arc<dyn RemoteStore>,
    options: SessionOptions,
    user: Option<UserId>,
) -> Session {
    let online = options.remote_configured && !options.offline && user.is_some();
    let repository = ReportRepository::new(storage, remote, Connectivity::new(online));

    Session {
        repository,
        user,
        sync: options.sync,
        remote_configured: options.remote_configured,
    }
}

/// A profile with a URL and key wins over the environment.
pub fn resolve_remote_config(
    profile: Option<&CliProfile>,
) -> Result<Option<RemoteConfig>, CliError> {
    if let Some(profile) = profile {
        if let Some(mut config) = profile.remote_config().map_err(CliError::Config)? {
            config.access_token = normalize_text_option(env::var(ACCESS_TOKEN_ENV).ok());
            return Ok(Some(config));
        }
    }
    Ok(RemoteConfig::from_env()?)
}

pub fn resolve_user(
    profile: Option<&CliProfile>,
    env_user: Option<String>,
) -> Result<Option<UserId>, CliError> {
    profile
        .and_then(CliProfile::user_id)
        .or_else(|| normalize_text_option(env_user))
        .map(|raw| raw.parse::<UserId>())
        .transpose()
        .map_err(CliError::from)
}

/// Wait for any in-flight drain, then drain what is left so the process
/// does not exit with sendable work queued.
pub async fn settle(session: &Session) -> Result<(), CliError> {
    loop {
        match session.repository.sync_now().await? {
            DrainOutcome::Busy => tokio::time::sleep(Duration::from_millis(25)).await,
            DrainOutcome::Drained(report) => {
                if report.halted {
                    eprintln!(
                        "Sync stopped early; {} change(s) remain queued",
                        report.remaining
                    );
                }
                return Ok(());
            }
            DrainOutcome::Offline | DrainOutcome::Idle => return Ok(()),
        }
    }
}

pub fn normalize_report_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyReportId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn resolve_location(parts: &[String]) -> Result<String, CliError> {
    let location = parts.join(" ");
    let location = location.trim();
    if location.is_empty() {
        Err(CliError::EmptyLocation)
    } else {
        Ok(location.to_string())
    }
}

/// Find a report by exact id, then by unique id prefix among cached reports.
pub async fn resolve_report(
    report_query: &str,
    repository: &ReportRepository,
) -> Result<Report, CliError> {
    if let Some(report) = repository.get_report_by_id(report_query).await? {
        return Ok(report);
    }

    let matching = repository
        .local()
        .read_reports()
        .await
        .into_iter()
        .filter(|report| report.id.starts_with(report_query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::ReportNotFound(report_query.to_string())),
        1 => matching
            .into_iter()
            .next()
            .ok_or_else(|| CliError::ReportNotFound(report_query.to_string())),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|report| short_id(&report.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousReportId(format!(
                "ID prefix '{report_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Parse `<field-id>=<value>` against the field set.
///
/// Returns `None` as the value when the right-hand side is empty, which
/// clears the field.
pub fn parse_assignment(
    raw: &str,
    fields: &[FieldDefinition],
) -> Result<(String, Option<FieldValue>), CliError> {
    let invalid = |reason: &str| CliError::InvalidAssignment(raw.to_string(), reason.to_string());

    let (field_id, value) = raw
        .split_once('=')
        .ok_or_else(|| invalid("expected <field-id>=<value>"))?;
    let field_id = ids::canonicalize(field_id.trim());
    let field = fields
        .iter()
        .find(|field| field.id == field_id)
        .ok_or_else(|| invalid("unknown field"))?;

    if value.trim().is_empty() {
        return Ok((field.id.clone(), None));
    }
    let value = field
        .value_type
        .parse_value(value)
        .ok_or_else(|| invalid(&format!("expected a {} value", field.value_type)))?;
    Ok((field.id.clone(), Some(value)))
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn report_preview(report: &Report, max_chars: usize) -> String {
    let collapsed = report.location.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_report_lines(reports: &[Report]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    reports
        .iter()
        .map(|report| {
            let short_id = short_id(&report.id);
            let preview = report_preview(report, 40);
            let relative_time = format_relative_time(report.timestamp.timestamp_millis(), now_ms);
            format!("{short_id:<13}  {preview:<40}  {relative_time}")
        })
        .collect()
}

pub fn report_to_list_item(report: &Report) -> ReportListItem {
    let now_ms = Utc::now().timestamp_millis();
    ReportListItem {
        id: report.id.clone(),
        location: report.location.clone(),
        timestamp: report.timestamp,
        relative_time: format_relative_time(report.timestamp.timestamp_millis(), now_ms),
        notes: report.notes.clone(),
        values: report.data.values().filter(|value| !value.is_blank()).count(),
    }
}

/// Render one report with values labelled by the field set.
///
/// Values for fields that no longer exist are shown under their raw id.
pub fn format_report_detail(report: &Report, fields: &[FieldDefinition]) -> Vec<String> {
    let mut lines = vec![
        format!("ID:        {}", report.id),
        format!("Location:  {}", report.location),
        format!("Recorded:  {}", format_timestamp(report.timestamp)),
    ];
    if let Some(modified) = report.last_modified {
        lines.push(format!("Modified:  {}", format_timestamp(modified)));
    }
    if !report.notes.is_empty() {
        lines.push(format!("Notes:     {}", report.notes));
    }

    for field in fields {
        if let Some(value) = report.value(&field.id) {
            lines.push(format!("  {:<28} {value}", field.label));
        }
    }
    for (field_id, value) in &report.data {
        if !fields.iter().any(|field| &field.id == field_id) {
            lines.push(format!("  {:<28} {value}", short_id(field_id)));
        }
    }
    lines
}

pub fn format_field_lines(fields: &[FieldDefinition]) -> Vec<String> {
    fields
        .iter()
        .map(|field| {
            let marker = if field.is_active { "*" } else { " " };
            format!(
                "{marker} {:>2}  {:<36}  {:<8}  {}",
                field.order, field.id, field.value_type, field.label
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
