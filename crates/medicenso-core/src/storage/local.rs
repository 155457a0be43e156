//! Local store: the device's current view of reports and field definitions.

use std::collections::HashSet;

use super::device::{DeviceStorage, StorageGuard};
use crate::ids;
use crate::models::{FieldDefinition, Report};
use crate::Result;

/// Snapshot of the known report set
pub const REPORTS_KEY: &str = "medicenso_cache_reports";
/// Snapshot of the known field-definition set
pub const FIELDS_KEY: &str = "medicenso_cache_fields";
/// Reports written by the local-only predecessor of the app
pub const LEGACY_REPORTS_KEY: &str = "medicenso_reports";
/// Field definitions written by the local-only predecessor of the app
pub const LEGACY_FIELDS_KEY: &str = "medicenso_fields";

/// Durable snapshot of reports and field definitions on the device.
///
/// Public reads never fail: missing or corrupt snapshots read as empty.
/// Updates inside the crate load strictly and stop on a storage error.
#[derive(Clone)]
pub struct LocalStore {
    storage: DeviceStorage,
}

impl LocalStore {
    pub const fn new(storage: DeviceStorage) -> Self {
        Self { storage }
    }

    /// Reports, newest first, with payload keys canonicalized.
    pub async fn read_reports(&self) -> Vec<Report> {
        let guard = self.storage.lock().await;
        Self::read_reports_in(&guard).await
    }

    pub async fn write_reports(&self, reports: &[Report]) -> Result<()> {
        let guard = self.storage.lock().await;
        Self::write_reports_in(&guard, reports).await
    }

    /// Field definitions with canonical ids, in stored order.
    pub async fn read_fields(&self) -> Vec<FieldDefinition> {
        let guard = self.storage.lock().await;
        Self::read_fields_in(&guard).await
    }

    pub async fn write_fields(&self, fields: &[FieldDefinition]) -> Result<()> {
        let guard = self.storage.lock().await;
        Self::write_fields_in(&guard, fields).await
    }

    /// Forget both snapshots.
    pub async fn clear(&self) -> Result<()> {
        let guard = self.storage.lock().await;
        guard.remove(REPORTS_KEY).await?;
        guard.remove(FIELDS_KEY).await
    }

    async fn read_reports_in(guard: &StorageGuard<'_>) -> Vec<Report> {
        Self::load_reports_in(guard).await.unwrap_or_else(|error| {
            tracing::warn!("Failed to read cached reports: {error}");
            Vec::new()
        })
    }

    /// Cached reports for a read-modify-write; storage errors propagate.
    pub(crate) async fn load_reports_in(guard: &StorageGuard<'_>) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> = guard.try_read_sequence(REPORTS_KEY).await?;
        let mut healed = false;
        for report in &mut reports {
            healed |= report.canonicalize_keys();
        }

        if healed {
            tracing::debug!("Rewrote legacy field ids in cached reports");
            if let Err(error) = Self::write_reports_in(guard, &reports).await {
                tracing::warn!("Failed to persist healed report snapshot: {error}");
            }
        }

        Ok(reports)
    }

    pub(crate) async fn write_reports_in(guard: &StorageGuard<'_>, reports: &[Report]) -> Result<()> {
        guard.write_sequence(REPORTS_KEY, reports).await
    }

    async fn read_fields_in(guard: &StorageGuard<'_>) -> Vec<FieldDefinition> {
        Self::load_fields_in(guard).await.unwrap_or_else(|error| {
            tracing::warn!("Failed to read cached fields: {error}");
            Vec::new()
        })
    }

    pub(crate) async fn load_fields_in(guard: &StorageGuard<'_>) -> Result<Vec<FieldDefinition>> {
        let fields: Vec<FieldDefinition> = guard.try_read_sequence(FIELDS_KEY).await?;
        let (fields, healed) = canonicalize_fields(fields);

        if healed {
            if let Err(error) = Self::write_fields_in(guard, &fields).await {
                tracing::warn!("Failed to persist healed field snapshot: {error}");
            }
        }

        Ok(fields)
    }

    pub(crate) async fn write_fields_in(
        guard: &StorageGuard<'_>,
        fields: &[FieldDefinition],
    ) -> Result<()> {
        guard.write_sequence(FIELDS_KEY, fields).await
    }

    /// Reports left behind by the local-only predecessor of the app.
    pub async fn read_legacy_reports(&self) -> Vec<Report> {
        let guard = self.storage.lock().await;
        guard.read_sequence(LEGACY_REPORTS_KEY).await
    }

    /// Field definitions left behind by the local-only predecessor of the app.
    pub async fn read_legacy_fields(&self) -> Vec<FieldDefinition> {
        let guard = self.storage.lock().await;
        guard.read_sequence(LEGACY_FIELDS_KEY).await
    }

    pub async fn clear_legacy(&self) -> Result<()> {
        let guard = self.storage.lock().await;
        guard.remove(LEGACY_REPORTS_KEY).await?;
        guard.remove(LEGACY_FIELDS_KEY).await
    }
}

/// Canonicalize field ids, dropping later duplicates.
///
/// Returns the fields and whether anything changed.
pub(crate) fn canonicalize_fields(fields: Vec<FieldDefinition>) -> (Vec<FieldDefinition>, bool) {
    let mut seen = HashSet::new();
    let mut changed = false;
    let mut canonical = Vec::with_capacity(fields.len());

    for mut field in fields {
        let id = ids::canonicalize(&field.id);
        if id != field.id {
            field.id = id;
            changed = true;
        }
        if seen.insert(field.id.clone()) {
            canonical.push(field);
        } else {
            changed = true;
        }
    }

    (canonical, changed)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{default_fields, FieldType, FieldValue};

    async fn setup() -> (DeviceStorage, LocalStore) {
        let storage = DeviceStorage::open_in_memory().await.unwrap();
        let store = LocalStore::new(storage.clone());
        (storage, store)
    }

    fn report(location: &str) -> Report {
        Report {
            id: ids::mint_id(),
            location: location.to_string(),
            timestamp: Utc::now(),
            last_modified: None,
            notes: String::new(),
            data: BTreeMap::new(),
            user_id: Some("user-1".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_store_reads_empty() {
        let (_, store) = setup().await;
        assert!(store.read_reports().await.is_empty());
        assert!(store.read_fields().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_then_read_reports() {
        let (_, store) = setup().await;
        let reports = vec![report("B"), report("A")];

        store.write_reports(&reports).await.unwrap();
        assert_eq!(store.read_reports().await, reports);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_snapshot_fails_open() {
        let (storage, store) = setup().await;
        storage.set(REPORTS_KEY, "not json at all").await.unwrap();
        storage.set(FIELDS_KEY, "[{\"id\": 1}]").await.unwrap();

        assert!(store.read_reports().await.is_empty());
        assert!(store.read_fields().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_snapshot_fails_strict_loads() {
        let (storage, store) = setup().await;
        storage.plant_unreadable(REPORTS_KEY).await;

        assert!(store.read_reports().await.is_empty());
        let guard = storage.lock().await;
        assert!(LocalStore::load_reports_in(&guard).await.is_err());
        assert!(LocalStore::load_fields_in(&guard).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_heals_legacy_payload_keys() {
        let (storage, store) = setup().await;
        let mut stale = report("Block 4");
        stale
            .data
            .insert("total_pop".to_string(), FieldValue::Number(6.0));
        store.write_reports(&[stale]).await.unwrap();

        let reports = store.read_reports().await;
        assert!(reports[0].has_value(ids::TOTAL_POPULATION_FIELD_ID));

        let raw = storage.get(REPORTS_KEY).await.unwrap().unwrap();
        assert!(!raw.contains("total_pop"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_fields_canonicalizes_and_dedupes() {
        let (_, store) = setup().await;
        let mut legacy = FieldDefinition::custom("Población", FieldType::Number, 1);
        legacy.id = "total_pop".to_string();
        let mut duplicate = legacy.clone();
        duplicate.id = ids::TOTAL_POPULATION_FIELD_ID.to_string();
        store.write_fields(&[legacy, duplicate]).await.unwrap();

        let fields = store.read_fields().await;
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id, ids::TOTAL_POPULATION_FIELD_ID);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_removes_snapshots_only() {
        let (storage, store) = setup().await;
        store.write_reports(&[report("A")]).await.unwrap();
        store.write_fields(&default_fields()).await.unwrap();
        storage.set(LEGACY_REPORTS_KEY, "[]").await.unwrap();

        store.clear().await.unwrap();

        assert!(store.read_reports().await.is_empty());
        assert!(store.read_fields().await.is_empty());
        assert!(storage.get(LEGACY_REPORTS_KEY).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn legacy_area_reads_and_clears() {
        let (storage, store) = setup().await;
        let legacy = serde_json::to_string(&[report("Old")]).unwrap();
        storage.set(LEGACY_REPORTS_KEY, &legacy).await.unwrap();

        assert_eq!(store.read_legacy_reports().await.len(), 1);
        store.clear_legacy().await.unwrap();
        assert!(store.read_legacy_reports().await.is_empty());
    }
}
