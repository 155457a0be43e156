//! Report and field repository: the single entry point for UI-level callers.
//!
//! Every mutation is applied to the local store first, queued for the remote
//! store in the same locked step, and then handed to the sync engine without
//! waiting. Reads are served from the local store; the network is only
//! awaited when the cache is cold.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::ids;
use crate::models::{
    default_fields, FieldDefinition, ParkedOperation, PendingOperation, Report, ReportDraft,
    UserId,
};
use crate::remote::RemoteStore;
use crate::storage::{canonicalize_fields, DeviceStorage, LocalStore};
use crate::sync::{Connectivity, DrainOutcome, PendingQueue, SyncEngine, SyncStatus};
use crate::{Error, Result};

/// Dashboard header figures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportSummary {
    pub total_reports: usize,
    /// Sum of the numeric "total population" values across reports
    pub total_population: f64,
}

/// Façade over the local store, the pending queue and the sync engine.
#[derive(Clone)]
pub struct ReportRepository {
    storage: DeviceStorage,
    local: LocalStore,
    engine: SyncEngine,
    /// Bumped on every local mutation so a slow revalidation can tell that
    /// its remote snapshot is older than the cache.
    generation: Arc<AtomicU64>,
}

impl ReportRepository {
    pub fn new(
        storage: DeviceStorage,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
    ) -> Self {
        let queue = PendingQueue::new(storage.clone());
        Self {
            local: LocalStore::new(storage.clone()),
            engine: SyncEngine::new(queue, remote, connectivity),
            storage,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn connectivity(&self) -> &Connectivity {
        self.engine.connectivity()
    }

    pub(crate) const fn storage(&self) -> &DeviceStorage {
        &self.storage
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteStore> {
        self.engine.remote()
    }

    pub(crate) fn is_online(&self) -> bool {
        self.engine.connectivity().is_online()
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// All cached reports, newest first.
    ///
    /// A cold cache waits for the remote store and seeds the cache. A warm
    /// cache is returned at once and refreshed in the background.
    pub async fn get_reports(&self, user: &UserId) -> Result<Vec<Report>> {
        let cached = self.local.read_reports().await;
        if !cached.is_empty() {
            if self.is_online() {
                let repository = self.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    repository.revalidate_reports(&user).await;
                });
            }
            return Ok(cached);
        }

        if !self.is_online() {
            return Ok(cached);
        }

        self.revalidate_reports(user).await;
        Ok(self.local.read_reports().await)
    }

    /// Replace the cache with the remote report set.
    ///
    /// Skipped while operations are pending or when the cache changed during
    /// the fetch. Returns whether the cache was replaced.
    pub async fn revalidate_reports(&self, user: &UserId) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        if !self.engine.queue().is_empty().await {
            tracing::debug!("Skipping report revalidation: operations pending");
            return false;
        }

        let mut fetched = match self.remote().fetch_reports(user).await {
            Ok(reports) => reports,
            Err(error) => {
                tracing::warn!("Report revalidation failed: {error}");
                return false;
            }
        };
        for report in &mut fetched {
            report.canonicalize_keys();
        }

        let guard = self.storage.lock().await;
        if !PendingQueue::load_in(&guard).await.is_ok_and(|queued| queued.is_empty())
            || self.generation.load(Ordering::Acquire) != generation
        {
            tracing::debug!("Discarding report revalidation: cache changed during fetch");
            return false;
        }
        match LocalStore::write_reports_in(&guard, &fetched).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("Failed to cache revalidated reports: {error}");
                false
            }
        }
    }

    /// Look a report up locally, then remotely for canonical ids.
    pub async fn get_report_by_id(&self, id: &str) -> Result<Option<Report>> {
        let cached = self.local.read_reports().await;
        if let Some(report) = cached.into_iter().find(|report| report.id == id) {
            return Ok(Some(report));
        }

        if !ids::is_canonical(id) || !self.is_online() {
            return Ok(None);
        }

        match self.remote().fetch_report(id).await {
            Ok(report) => Ok(report.map(|mut report| {
                report.canonicalize_keys();
                report
            })),
            Err(error) => {
                tracing::warn!("Remote lookup of report {id} failed: {error}");
                Ok(None)
            }
        }
    }

    /// Create a report owned by `user`.
    ///
    /// The report is cached and queued before this returns; the remote
    /// insert happens in the background.
    pub async fn save_report(&self, draft: ReportDraft, user: &UserId) -> Result<Report> {
        let location = validate_location(&draft.location)?;
        let (data, _) = ids::canonicalize_data(draft.data);
        let report = Report {
            id: ids::mint_id(),
            location,
            timestamp: Utc::now(),
            last_modified: None,
            notes: draft.notes.trim().to_string(),
            data,
            user_id: Some(user.as_str().to_string()),
        };

        {
            let guard = self.storage.lock().await;
            let mut reports = LocalStore::load_reports_in(&guard).await?;
            reports.insert(0, report.clone());
            LocalStore::write_reports_in(&guard, &reports).await?;
            PendingQueue::enqueue_in(&guard, PendingOperation::create_report(report.clone()))
                .await?;
            self.bump_generation();
        }

        self.engine.trigger();
        Ok(report)
    }

    /// Overwrite a report, caching it if it was not cached yet.
    pub async fn update_report(&self, mut report: Report) -> Result<Report> {
        report.location = validate_location(&report.location)?;
        if report.id.trim().is_empty() {
            return Err(Error::InvalidInput("report id must not be empty".to_string()));
        }
        report.canonicalize_keys();
        report.last_modified = Some(Utc::now());

        {
            let guard = self.storage.lock().await;
            let mut reports = LocalStore::load_reports_in(&guard).await?;
            if let Some(existing) = reports.iter_mut().find(|existing| existing.id == report.id) {
                *existing = report.clone();
            } else {
                let position = reports
                    .iter()
                    .position(|existing| existing.timestamp < report.timestamp)
                    .unwrap_or(reports.len());
                reports.insert(position, report.clone());
            }
            LocalStore::write_reports_in(&guard, &reports).await?;
            PendingQueue::enqueue_in(&guard, PendingOperation::update_report(report.clone()))
                .await?;
            self.bump_generation();
        }

        self.engine.trigger();
        Ok(report)
    }

    /// Remove a report. Returns whether it was cached.
    ///
    /// Ids that are not canonical cannot exist remotely, so no delete is
    /// queued for them.
    pub async fn delete_report(&self, id: &str) -> Result<bool> {
        let queued = ids::is_canonical(id);
        let existed = {
            let guard = self.storage.lock().await;
            let mut reports = LocalStore::load_reports_in(&guard).await?;
            let before = reports.len();
            reports.retain(|report| report.id != id);
            let existed = reports.len() != before;

            if existed {
                LocalStore::write_reports_in(&guard, &reports).await?;
            }
            if queued {
                PendingQueue::enqueue_in(&guard, PendingOperation::delete_report(id)).await?;
            }
            self.bump_generation();
            existed
        };

        if queued {
            self.engine.trigger();
        } else {
            tracing::debug!("Deleted non-canonical report {id} locally only");
        }
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// The user's field set sorted by `order`.
    ///
    /// Falls back to the default set, without storing it anywhere, when
    /// neither the cache nor the remote store has one.
    pub async fn get_fields(&self, user: &UserId) -> Result<Vec<FieldDefinition>> {
        let mut fields = self.local.read_fields().await;
        if !fields.is_empty() {
            if self.is_online() {
                let repository = self.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    repository.revalidate_fields(&user).await;
                });
            }
            fields.sort_by_key(|field| field.order);
            return Ok(fields);
        }

        if self.is_online() {
            self.revalidate_fields(user).await;
            let mut fields = self.local.read_fields().await;
            if !fields.is_empty() {
                fields.sort_by_key(|field| field.order);
                return Ok(fields);
            }
        }

        Ok(default_fields())
    }

    /// Replace the cached field set with the remote one, if it has any.
    pub async fn revalidate_fields(&self, user: &UserId) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        if !self.engine.queue().is_empty().await {
            tracing::debug!("Skipping field revalidation: operations pending");
            return false;
        }

        let fetched = match self.remote().fetch_field_definitions(user).await {
            Ok(fields) => fields,
            Err(error) => {
                tracing::warn!("Field revalidation failed: {error}");
                return false;
            }
        };
        if fetched.is_empty() {
            return false;
        }
        let (fetched, _) = canonicalize_fields(fetched);

        let guard = self.storage.lock().await;
        if !PendingQueue::load_in(&guard).await.is_ok_and(|queued| queued.is_empty())
            || self.generation.load(Ordering::Acquire) != generation
        {
            tracing::debug!("Discarding field revalidation: cache changed during fetch");
            return false;
        }
        match LocalStore::write_fields_in(&guard, &fetched).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("Failed to cache revalidated fields: {error}");
                false
            }
        }
    }

    /// Replace the user's field set.
    ///
    /// Ids are canonicalized, labels must be non-blank and ids unique, and
    /// `order` is renumbered 1..n keeping the given relative order.
    pub async fn save_fields(
        &self,
        fields: Vec<FieldDefinition>,
        user: &UserId,
    ) -> Result<Vec<FieldDefinition>> {
        let fields = normalize_field_set(fields)?;

        {
            let guard = self.storage.lock().await;
            LocalStore::write_fields_in(&guard, &fields).await?;
            PendingQueue::enqueue_in(&guard, PendingOperation::replace_fields(user, fields.clone()))
                .await?;
            self.bump_generation();
        }

        self.engine.trigger();
        Ok(fields)
    }

    /// Whether any cached report holds a non-blank value for the field.
    pub async fn is_field_in_use(&self, field_id: &str) -> bool {
        let field_id = ids::canonicalize(field_id);
        self.local
            .read_reports()
            .await
            .iter()
            .any(|report| report.has_value(&field_id))
    }

    // ------------------------------------------------------------------
    // Sync and reporting
    // ------------------------------------------------------------------

    pub async fn pending_count(&self) -> usize {
        self.engine.queue().len().await
    }

    pub async fn status(&self) -> SyncStatus {
        self.engine.status().await
    }

    /// Drain the queue now and wait for the result.
    pub async fn sync_now(&self) -> Result<DrainOutcome> {
        self.engine.drain().await
    }

    pub async fn failed_operations(&self) -> Vec<ParkedOperation> {
        self.engine.queue().parked().await
    }

    pub async fn clear_failed_operations(&self) -> Result<usize> {
        self.engine.queue().clear_parked().await
    }

    pub async fn summary(&self) -> ReportSummary {
        let reports = self.local.read_reports().await;
        let total_population = reports
            .iter()
            .filter_map(|report| report.value(ids::TOTAL_POPULATION_FIELD_ID))
            .filter_map(crate::models::FieldValue::as_number)
            .sum();

        ReportSummary {
            total_reports: reports.len(),
            total_population,
        }
    }

    /// Read-only view for export collaborators.
    pub async fn snapshot(&self, user: &UserId) -> Result<(Vec<Report>, Vec<FieldDefinition>)> {
        let reports = self.get_reports(user).await?;
        let fields = self.get_fields(user).await?;
        Ok((reports, fields))
    }
}

fn validate_location(location: &str) -> Result<String> {
    let location = location.trim();
    if location.is_empty() {
        return Err(Error::InvalidInput("location must not be empty".to_string()));
    }
    Ok(location.to_string())
}

fn normalize_field_set(fields: Vec<FieldDefinition>) -> Result<Vec<FieldDefinition>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(fields.len());

    for mut field in fields {
        let label = field.label.trim().to_string();
        if label.is_empty() {
            return Err(Error::InvalidInput(format!(
                "field {} must have a label",
                field.id
            )));
        }
        field.label = label;
        field.id = ids::canonicalize(&field.id);
        if !seen.insert(field.id.clone()) {
            return Err(Error::InvalidInput(format!(
                "field id {} appears more than once",
                field.id
            )));
        }
        normalized.push(field);
    }

    normalized.sort_by_key(|field| field.order);
    for (position, field) in normalized.iter_mut().enumerate() {
        field.order = i32::try_from(position + 1).unwrap_or(i32::MAX);
    }
    Ok(normalized)
}
