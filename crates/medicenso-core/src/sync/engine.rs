//! Sync engine: drains the pending queue against the remote store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::{Connectivity, PendingQueue, SyncState, SyncStatus};
use crate::models::{OperationKind, OperationPayload, PendingOperation, Report, UserId};
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::canonicalize_fields;
use crate::Result;

/// Result of one drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Skipped: the device is offline
    Offline,
    /// Skipped: another drain is in flight
    Busy,
    /// Nothing was queued
    Idle,
    Drained(DrainReport),
}

/// What a drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations confirmed by the remote store and removed
    pub applied: usize,
    /// Unrecoverable operations moved to the failed log
    pub parked: usize,
    /// Operations still queued after the pass
    pub remaining: usize,
    /// Whether the pass stopped at a failing operation
    pub halted: bool,
}

/// Drains the pending queue in FIFO order, one drain at a time.
///
/// Cloning is cheap; all clones share the in-flight guard.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

struct Inner {
    queue: PendingQueue,
    remote: Arc<dyn RemoteStore>,
    connectivity: Connectivity,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag when a drain ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(
        queue: PendingQueue,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                remote,
                connectivity,
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.inner.queue
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn is_draining(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Run one drain pass.
    ///
    /// Stops at the first remote failure, leaving that operation and
    /// everything behind it queued. Errors are local storage failures only.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        if !self.inner.connectivity.is_online() {
            tracing::debug!("Skipping drain: offline");
            return Ok(DrainOutcome::Offline);
        }

        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Skipping drain: another drain is in flight");
            return Ok(DrainOutcome::Busy);
        }
        let _in_flight = InFlight(&self.inner.in_flight);

        let operations = self.inner.queue.peek_all().await;
        if operations.is_empty() {
            return Ok(DrainOutcome::Idle);
        }

        let mut report = DrainReport::default();
        for operation in operations {
            if let Some(reason) = operation.unrecoverable_reason() {
                tracing::warn!(
                    "Parking unrecoverable operation ({}): {reason}",
                    operation.describe()
                );
                self.inner.queue.park(&operation, reason).await?;
                report.parked += 1;
                continue;
            }

            if !self.inner.connectivity.is_online() {
                tracing::debug!("Went offline during drain");
                report.halted = true;
                break;
            }

            match self.apply(&operation).await {
                Ok(()) => {
                    self.inner.queue.dequeue_front(operation.id).await?;
                    report.applied += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        "Sync halted at {}: {error}. Will retry on next trigger.",
                        operation.describe()
                    );
                    report.halted = true;
                    break;
                }
            }
        }

        report.remaining = self.inner.queue.len().await;
        tracing::info!(
            applied = report.applied,
            parked = report.parked,
            remaining = report.remaining,
            "Drain finished"
        );
        Ok(DrainOutcome::Drained(report))
    }

    async fn apply(&self, operation: &PendingOperation) -> std::result::Result<(), RemoteError> {
        let remote = &self.inner.remote;

        match (&operation.kind, &operation.payload) {
            (_, OperationPayload::FieldSet { user_id, fields }) => {
                let user: UserId = user_id
                    .parse()
                    .map_err(|_| RemoteError::InvalidConfiguration("field set has no owner".into()))?;
                let (fields, _) = canonicalize_fields(fields.clone());
                remote.delete_field_definitions(&user).await?;
                remote.insert_field_definitions(&user, &fields).await
            }
            (OperationKind::Create, OperationPayload::Report(report)) => {
                remote.insert_reports(&[stamped(report)]).await
            }
            (OperationKind::Update, OperationPayload::Report(report)) => {
                remote.update_report(&stamped(report)).await
            }
            (OperationKind::Delete, _) => match operation.target_id() {
                Some(id) => remote.delete_report(id).await,
                None => Ok(()),
            },
            (_, OperationPayload::ReportRef { id }) => Err(RemoteError::InvalidConfiguration(
                format!("operation on report {id} carries no report data"),
            )),
        }
    }

    /// Start a drain without waiting for it.
    ///
    /// Nothing is spawned while offline; the reconnect transition drains.
    pub fn trigger(&self) -> Option<JoinHandle<()>> {
        if !self.inner.connectivity.is_online() {
            tracing::debug!("Not triggering drain: offline");
            return None;
        }
        let engine = self.clone();
        Some(tokio::spawn(async move {
            engine.drain_logged().await;
        }))
    }

    /// Drain on a fixed interval while online with work queued, and on
    /// every offline to online transition.
    pub fn spawn_background(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        let mut online = self.inner.connectivity.subscribe();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if engine.inner.connectivity.is_online()
                            && !engine.inner.queue.is_empty().await
                        {
                            engine.drain_logged().await;
                        }
                    }
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online.borrow_and_update() {
                            tracing::debug!("Back online, draining");
                            engine.drain_logged().await;
                        }
                    }
                }
            }
        })
    }

    async fn drain_logged(&self) {
        if let Err(error) = self.drain().await {
            tracing::warn!("Drain failed on local storage: {error}");
        }
    }

    /// Current indicator state and counts.
    pub async fn status(&self) -> SyncStatus {
        let pending = self.inner.queue.len().await;
        let parked = self.inner.queue.parked().await.len();
        let state = if !self.inner.connectivity.is_online() {
            SyncState::Offline
        } else if self.is_draining() {
            SyncState::Syncing
        } else if pending > 0 {
            SyncState::Pending
        } else {
            SyncState::Synced
        };

        SyncStatus {
            state,
            pending,
            parked,
        }
    }
}

/// Copy of `report` as sent remotely: canonical keys, applied-now stamp.
fn stamped(report: &Report) -> Report {
    let mut report = report.clone();
    report.canonicalize_keys();
    report.last_modified = Some(Utc::now());
    report
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ids;
    use crate::models::{default_fields, FieldValue};
    use crate::remote::{MemoryRemoteStore, RemoteCall};
    use crate::storage::DeviceStorage;

    async fn setup(online: bool) -> (SyncEngine, PendingQueue, MemoryRemoteStore) {
        let storage = DeviceStorage::open_in_memory().await.unwrap();
        let queue = PendingQueue::new(storage);
        let remote = MemoryRemoteStore::new();
        let engine = SyncEngine::new(
            queue.clone(),
            Arc::new(remote.clone()),
            Connectivity::new(online),
        );
        (engine, queue, remote)
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
    async fn offline_drain_issues_no_calls() {
        let (engine, queue, remote) = setup(false).await;
        queue
            .enqueue(PendingOperation::create_report(report("A")))
            .await
            .unwrap();

        assert_eq!(engine.drain().await.unwrap(), DrainOutcome::Offline);
        assert!(remote.calls().await.is_empty());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_queue_drain_is_idle() {
        let (engine, _, remote) = setup(true).await;
        assert_eq!(engine.drain().await.unwrap(), DrainOutcome::Idle);
        assert!(remote.calls().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drain_applies_in_order_and_stamps_last_modified() {
        let (engine, queue, remote) = setup(true).await;
        let mut row = report("A");
        queue
            .enqueue(PendingOperation::create_report(row.clone()))
            .await
            .unwrap();
        row.location = "B".to_string();
        queue
            .enqueue(PendingOperation::update_report(row.clone()))
            .await
            .unwrap();

        let outcome = engine.drain().await.unwrap();
        assert_eq!(
            outcome,
            DrainOutcome::Drained(DrainReport {
                applied: 2,
                parked: 0,
                remaining: 0,
                halted: false,
            })
        );

        let stored = remote.reports().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].location, "B");
        assert!(stored[0].last_modified.is_some());
        assert_eq!(
            remote.write_calls().await,
            vec![
                RemoteCall::InsertReports {
                    ids: vec![row.id.clone()]
                },
                RemoteCall::UpdateReport { id: row.id.clone() },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_halts_and_keeps_order() {
        let (engine, queue, remote) = setup(true).await;
        let ops: Vec<PendingOperation> = ["A", "B", "C"]
            .into_iter()
            .map(|location| PendingOperation::create_report(report(location)))
            .collect();
        for op in &ops {
            queue.enqueue(op.clone()).await.unwrap();
        }
        remote.fail_call(1).await;

        let outcome = engine.drain().await.unwrap();

        assert_eq!(
            outcome,
            DrainOutcome::Drained(DrainReport {
                applied: 1,
                parked: 0,
                remaining: 2,
                halted: true,
            })
        );
        assert_eq!(queue.peek_all().await, ops[1..].to_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unrecoverable_operations_are_parked_not_blocking() {
        let (engine, queue, remote) = setup(true).await;
        let mut legacy = report("Legacy");
        legacy.id = "1714560000000".to_string();
        queue
            .enqueue(PendingOperation::update_report(legacy))
            .await
            .unwrap();
        let good = report("Good");
        queue
            .enqueue(PendingOperation::create_report(good.clone()))
            .await
            .unwrap();

        let outcome = engine.drain().await.unwrap();

        assert_eq!(
            outcome,
            DrainOutcome::Drained(DrainReport {
                applied: 1,
                parked: 1,
                remaining: 0,
                halted: false,
            })
        );
        assert_eq!(remote.reports().await.len(), 1);
        assert_eq!(queue.parked().await.len(), 1);
        assert_eq!(engine.status().await.parked, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn field_set_is_replaced_with_canonical_ids() {
        let (engine, queue, remote) = setup(true).await;
        let user: UserId = "user-1".parse().unwrap();
        let mut fields = default_fields();
        fields[2].id = "total_pop".to_string();
        queue
            .enqueue(PendingOperation::replace_fields(&user, fields))
            .await
            .unwrap();

        engine.drain().await.unwrap();

        assert_eq!(
            remote.write_calls().await,
            vec![
                RemoteCall::DeleteFieldDefinitions {
                    user_id: "user-1".to_string()
                },
                RemoteCall::InsertFieldDefinitions {
                    user_id: "user-1".to_string(),
                    count: 10
                },
            ]
        );
        let stored = remote.fetch_field_definitions(&user).await.unwrap();
        assert_eq!(stored, default_fields());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn report_keys_are_canonicalized_when_sent() {
        let (engine, queue, remote) = setup(true).await;
        let mut row = report("A");
        row.data
            .insert("total_pop".to_string(), FieldValue::Number(4.0));
        queue
            .enqueue(PendingOperation::create_report(row))
            .await
            .unwrap();

        engine.drain().await.unwrap();

        let stored = remote.reports().await;
        assert!(stored[0].has_value(ids::TOTAL_POPULATION_FIELD_ID));
        assert!(!stored[0].data.contains_key("total_pop"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_drain_is_busy() {
        let (engine, queue, _) = setup(true).await;
        queue
            .enqueue(PendingOperation::create_report(report("A")))
            .await
            .unwrap();

        engine.inner.in_flight.store(true, Ordering::Release);
        assert_eq!(engine.drain().await.unwrap(), DrainOutcome::Busy);
        assert_eq!(engine.status().await.state, SyncState::Syncing);

        engine.inner.in_flight.store(false, Ordering::Release);
        assert!(matches!(
            engine.drain().await.unwrap(),
            DrainOutcome::Drained(_)
        ));
        assert!(!engine.is_draining());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_reflects_connectivity_and_queue() {
        let (engine, queue, _) = setup(false).await;
        assert_eq!(engine.status().await.state, SyncState::Offline);

        engine.connectivity().set_online(true);
        assert_eq!(engine.status().await.state, SyncState::Synced);

        queue
            .enqueue(PendingOperation::delete_report(ids::mint_id()))
            .await
            .unwrap();
        let status = engine.status().await;
        assert_eq!(status.state, SyncState::Pending);
        assert_eq!(status.pending, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_task_drains_on_reconnect() {
        let (engine, queue, remote) = setup(false).await;
        queue
            .enqueue(PendingOperation::create_report(report("A")))
            .await
            .unwrap();

        let handle = engine.spawn_background(Duration::from_secs(3600));
        engine.connectivity().set_online(true);

        for _ in 0..100 {
            if queue.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(queue.is_empty().await);
        assert_eq!(remote.write_calls().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_ticker_retries_while_online() {
        let (engine, queue, remote) = setup(true).await;
        queue
            .enqueue(PendingOperation::create_report(report("A")))
            .await
            .unwrap();
        remote.set_fail_all(true).await;

        let outcome = engine.drain().await.unwrap();
        assert!(matches!(
            outcome,
            DrainOutcome::Drained(DrainReport { halted: true, remaining: 1, .. })
        ));

        remote.set_fail_all(false).await;
        let handle = engine.spawn_background(Duration::from_millis(50));

        for _ in 0..100 {
            if queue.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(queue.is_empty().await);
        assert!(engine.connectivity().is_online());
        assert_eq!(remote.reports().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_runs_a_drain() {
        let (engine, queue, _) = setup(true).await;
        queue
            .enqueue(PendingOperation::delete_report(ids::mint_id()))
            .await
            .unwrap();

        engine.trigger().unwrap().await.unwrap();
        assert!(queue.is_empty().await);

        engine.connectivity().set_online(false);
        assert!(engine.trigger().is_none());
    }
}
