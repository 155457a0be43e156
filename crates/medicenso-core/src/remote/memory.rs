//! In-process remote store with a call log and failure injection.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::models::{FieldDefinition, Report, UserId};

/// One request received by a [`MemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FetchReports { user_id: String },
    FetchReport { id: String },
    InsertReports { ids: Vec<String> },
    UpdateReport { id: String },
    DeleteReport { id: String },
    FetchFieldDefinitions { user_id: String },
    InsertFieldDefinitions { user_id: String, count: usize },
    DeleteFieldDefinitions { user_id: String },
}

impl RemoteCall {
    /// Whether this call changes remote state.
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::InsertReports { .. }
                | Self::UpdateReport { .. }
                | Self::DeleteReport { .. }
                | Self::InsertFieldDefinitions { .. }
                | Self::DeleteFieldDefinitions { .. }
        )
    }
}

#[derive(Default)]
struct State {
    reports: Vec<Report>,
    fields: Vec<(String, FieldDefinition)>,
    calls: Vec<RemoteCall>,
    failing_calls: HashSet<usize>,
    fail_all: bool,
}

/// Remote store held in memory.
///
/// Every request is appended to the call log, including failed ones. Calls
/// are numbered from zero in the order they arrive.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<State>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the call with the given index fail.
    pub async fn fail_call(&self, index: usize) {
        self.state.lock().await.failing_calls.insert(index);
    }

    /// Make every call fail until switched off again.
    pub async fn set_fail_all(&self, fail_all: bool) {
        self.state.lock().await.fail_all = fail_all;
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls that change remote state, in arrival order.
    pub async fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .await
            .into_iter()
            .filter(RemoteCall::is_write)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Every stored report, newest first.
    pub async fn reports(&self) -> Vec<Report> {
        let mut reports = self.state.lock().await.reports.clone();
        sort_newest_first(&mut reports);
        reports
    }

    /// Put reports in place without logging a call.
    pub async fn seed_reports(&self, reports: Vec<Report>) {
        let mut state = self.state.lock().await;
        for report in reports {
            upsert(&mut state.reports, report);
        }
    }

    /// Put field definitions in place without logging a call.
    pub async fn seed_field_definitions(&self, user: &UserId, fields: Vec<FieldDefinition>) {
        let mut state = self.state.lock().await;
        state.fields.extend(
            fields
                .into_iter()
                .map(|field| (user.as_str().to_string(), field)),
        );
    }

    async fn record(&self, call: RemoteCall) -> RemoteResult<tokio::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().await;
        let index = state.calls.len();
        let description = format!("{call:?}");
        state.calls.push(call);

        if state.fail_all || state.failing_calls.contains(&index) {
            return Err(RemoteError::Unavailable(format!(
                "injected failure for call {index}: {description}"
            )));
        }
        Ok(state)
    }
}

fn sort_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

fn upsert(reports: &mut Vec<Report>, report: Report) {
    if let Some(existing) = reports.iter_mut().find(|existing| existing.id == report.id) {
        *existing = report;
    } else {
        reports.push(report);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_reports(&self, user: &UserId) -> RemoteResult<Vec<Report>> {
        let state = self
            .record(RemoteCall::FetchReports {
                user_id: user.as_str().to_string(),
            })
            .await?;
        let mut reports: Vec<Report> = state
            .reports
            .iter()
            .filter(|report| report.user_id.as_deref() == Some(user.as_str()))
            .cloned()
            .collect();
        sort_newest_first(&mut reports);
        Ok(reports)
    }

    async fn fetch_report(&self, id: &str) -> RemoteResult<Option<Report>> {
        let state = self
            .record(RemoteCall::FetchReport { id: id.to_string() })
            .await?;
        Ok(state.reports.iter().find(|report| report.id == id).cloned())
    }

    async fn insert_reports(&self, reports: &[Report]) -> RemoteResult<()> {
        let mut state = self
            .record(RemoteCall::InsertReports {
                ids: reports.iter().map(|report| report.id.clone()).collect(),
            })
            .await?;
        for report in reports {
            upsert(&mut state.reports, report.clone());
        }
        Ok(())
    }

    async fn update_report(&self, report: &Report) -> RemoteResult<()> {
        let mut state = self
            .record(RemoteCall::UpdateReport {
                id: report.id.clone(),
            })
            .await?;
        if let Some(existing) = state.reports.iter_mut().find(|row| row.id == report.id) {
            let owner = existing.user_id.take();
            *existing = report.clone();
            if existing.user_id.is_none() {
                existing.user_id = owner;
            }
        }
        Ok(())
    }

    async fn delete_report(&self, id: &str) -> RemoteResult<()> {
        let mut state = self
            .record(RemoteCall::DeleteReport { id: id.to_string() })
            .await?;
        state.reports.retain(|report| report.id != id);
        Ok(())
    }

    async fn fetch_field_definitions(&self, user: &UserId) -> RemoteResult<Vec<FieldDefinition>> {
        let state = self
            .record(RemoteCall::FetchFieldDefinitions {
                user_id: user.as_str().to_string(),
            })
            .await?;
        let mut fields: Vec<FieldDefinition> = state
            .fields
            .iter()
            .filter(|(owner, _)| owner == user.as_str())
            .map(|(_, field)| field.clone())
            .collect();
        fields.sort_by_key(|field| field.order);
        Ok(fields)
    }

    async fn insert_field_definitions(
        &self,
        user: &UserId,
        fields: &[FieldDefinition],
    ) -> RemoteResult<()> {
        let mut state = self
            .record(RemoteCall::InsertFieldDefinitions {
                user_id: user.as_str().to_string(),
                count: fields.len(),
            })
            .await?;
        for field in fields {
            state
                .fields
                .retain(|(owner, existing)| owner != user.as_str() || existing.id != field.id);
            state
                .fields
                .push((user.as_str().to_string(), field.clone()));
        }
        Ok(())
    }

    async fn delete_field_definitions(&self, user: &UserId) -> RemoteResult<()> {
        let mut state = self
            .record(RemoteCall::DeleteFieldDefinitions {
                user_id: user.as_str().to_string(),
            })
            .await?;
        state.fields.retain(|(owner, _)| owner != user.as_str());
        Ok(())
    }
}
