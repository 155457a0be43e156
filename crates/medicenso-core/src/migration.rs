//! One-time upload of data left by the local-only predecessor of the app.

use std::collections::HashSet;

use crate::ids;
use crate::models::{Report, UserId};
use crate::repository::ReportRepository;
use crate::storage::{canonicalize_fields, LocalStore, LEGACY_FIELDS_KEY, LEGACY_REPORTS_KEY};
use crate::{Error, Result};

/// Counts of records uploaded by [`migrate_to_supabase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub reports: usize,
    pub fields: usize,
}

impl MigrationReport {
    pub const fn is_empty(&self) -> bool {
        self.reports == 0 && self.fields == 0
    }
}

/// Upload legacy local-only reports and fields on behalf of `user`.
///
/// An empty legacy area is a no-op that touches nothing remote. Otherwise
/// the device must be online. Legacy records get canonical ids and an
/// owner, migrated reports join the local cache, and the legacy area is
/// removed only after every upload succeeded.
pub async fn migrate_to_supabase(
    repository: &ReportRepository,
    user: &UserId,
) -> Result<MigrationReport> {
    let local = repository.local();
    let legacy_reports = local.read_legacy_reports().await;
    let legacy_fields = local.read_legacy_fields().await;

    if legacy_reports.is_empty() && legacy_fields.is_empty() {
        tracing::info!("No local-only data to migrate");
        return Ok(MigrationReport::default());
    }
    if !repository.is_online() {
        return Err(Error::Offline);
    }

    let reports: Vec<Report> = legacy_reports
        .into_iter()
        .map(|mut report| {
            if !ids::is_canonical(&report.id) {
                let derived = ids::legacy_report_id(&report.id);
                tracing::debug!("Legacy report {} becomes {derived}", report.id);
                report.id = derived;
            }
            report.canonicalize_keys();
            report.user_id = Some(user.as_str().to_string());
            report
        })
        .collect();
    let (fields, _) = canonicalize_fields(legacy_fields);

    let remote = repository.remote();
    if !reports.is_empty() {
        remote.insert_reports(&reports).await?;
    }
    if !fields.is_empty() {
        remote.insert_field_definitions(user, &fields).await?;
    }

    {
        let guard = repository.storage().lock().await;
        let mut cached = LocalStore::load_reports_in(&guard).await?;
        let known: HashSet<String> = cached.iter().map(|report| report.id.clone()).collect();
        cached.extend(
            reports
                .iter()
                .filter(|report| !known.contains(&report.id))
                .cloned(),
        );
        cached.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        LocalStore::write_reports_in(&guard, &cached).await?;

        if !fields.is_empty() && LocalStore::load_fields_in(&guard).await?.is_empty() {
            LocalStore::write_fields_in(&guard, &fields).await?;
        }

        guard.remove(LEGACY_REPORTS_KEY).await?;
        guard.remove(LEGACY_FIELDS_KEY).await?;
        repository.bump_generation();
    }

    let migrated = MigrationReport {
        reports: reports.len(),
        fields: fields.len(),
    };
    tracing::info!(
        reports = migrated.reports,
        fields = migrated.fields,
        "Migrated local-only data"
    );
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{default_fields, FieldValue};
    use crate::remote::MemoryRemoteStore;
    use crate::storage::DeviceStorage;
    use crate::sync::Connectivity;

    struct Harness {
        storage: DeviceStorage,
        repository: ReportRepository,
        remote: MemoryRemoteStore,
        user: UserId,
    }

    async fn setup(online: bool) -> Harness {
        let storage = DeviceStorage::open_in_memory().await.unwrap();
        let remote = MemoryRemoteStore::new();
        let repository = ReportRepository::new(
            storage.clone(),
            Arc::new(remote.clone()),
            Connectivity::new(online),
        );
        Harness {
            storage,
            repository,
            remote,
            user: "user-1".parse().unwrap(),
        }
    }

    fn legacy_report(id: &str, age_minutes: i64) -> Report {
        let mut data = BTreeMap::new();
        data.insert("total_pop".to_string(), FieldValue::Number(5.0));
        Report {
            id: id.to_string(),
            location: format!("Legacy {id}"),
            timestamp: Utc::now() - Duration::minutes(age_minutes),
            last_modified: None,
            notes: String::new(),
            data,
            user_id: None,
        }
    }

    async fn seed_legacy(storage: &DeviceStorage, reports: &[Report]) {
        let raw = serde_json::to_string(reports).unwrap();
        storage.set(LEGACY_REPORTS_KEY, &raw).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_legacy_area_makes_no_remote_calls() {
        let h = setup(false).await;

        let report = migrate_to_supabase(&h.repository, &h.user).await.unwrap();

        assert!(report.is_empty());
        assert!(h.remote.calls().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_migration_is_refused() {
        let h = setup(false).await;
        seed_legacy(&h.storage, &[legacy_report("1714560000000", 1)]).await;

        let error = migrate_to_supabase(&h.repository, &h.user).await.unwrap_err();

        assert!(matches!(error, Error::Offline));
        assert_eq!(h.repository.local().read_legacy_reports().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn migrates_canonicalizes_and_clears() {
        let h = setup(true).await;
        let canonical_id = ids::mint_id();
        seed_legacy(
            &h.storage,
            &[legacy_report("1714560000000", 5), legacy_report(&canonical_id, 1)],
        )
        .await;
        let raw_fields = serde_json::to_string(&default_fields()).unwrap();
        h.storage.set(LEGACY_FIELDS_KEY, &raw_fields).await.unwrap();

        let report = migrate_to_supabase(&h.repository, &h.user).await.unwrap();

        assert_eq!(report, MigrationReport { reports: 2, fields: 10 });
        let remote_reports = h.remote.reports().await;
        assert_eq!(remote_reports.len(), 2);
        assert_eq!(remote_reports[0].id, canonical_id);
        assert!(remote_reports.iter().all(|report| ids::is_canonical(&report.id)));
        assert!(remote_reports
            .iter()
            .all(|report| report.user_id.as_deref() == Some("user-1")));
        assert!(remote_reports
            .iter()
            .all(|report| report.has_value(ids::TOTAL_POPULATION_FIELD_ID)));

        let cached = h.repository.local().read_reports().await;
        assert_eq!(cached, remote_reports);
        assert!(h.repository.local().read_legacy_reports().await.is_empty());
        assert!(h.repository.local().read_legacy_fields().await.is_empty());

        let again = migrate_to_supabase(&h.repository, &h.user).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_after_partial_upload_does_not_duplicate_reports() {
        let h = setup(true).await;
        seed_legacy(&h.storage, &[legacy_report("1714560000000", 1)]).await;
        let raw_fields = serde_json::to_string(&default_fields()).unwrap();
        h.storage.set(LEGACY_FIELDS_KEY, &raw_fields).await.unwrap();
        h.remote.fail_call(1).await;

        let error = migrate_to_supabase(&h.repository, &h.user).await.unwrap_err();
        assert!(matches!(error, Error::Remote(_)));
        assert_eq!(h.remote.reports().await.len(), 1);
        assert_eq!(h.repository.local().read_legacy_reports().await.len(), 1);

        let report = migrate_to_supabase(&h.repository, &h.user).await.unwrap();

        assert_eq!(report, MigrationReport { reports: 1, fields: 10 });
        let remote_reports = h.remote.reports().await;
        assert_eq!(remote_reports.len(), 1);
        assert_eq!(remote_reports[0].id, ids::legacy_report_id("1714560000000"));
        assert_eq!(h.repository.local().read_reports().await, remote_reports);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_failure_keeps_legacy_area() {
        let h = setup(true).await;
        seed_legacy(&h.storage, &[legacy_report("1714560000000", 1)]).await;
        h.remote.set_fail_all(true).await;

        let error = migrate_to_supabase(&h.repository, &h.user).await.unwrap_err();

        assert!(matches!(error, Error::Remote(_)));
        assert_eq!(h.repository.local().read_legacy_reports().await.len(), 1);
        assert!(h.repository.local().read_reports().await.is_empty());
    }
}
