//! Durable FIFO log of operations not yet confirmed by the remote store.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ParkedOperation, PendingOperation};
use crate::storage::{DeviceStorage, StorageGuard};
use crate::Result;

/// Ordered pending-operation log
pub const QUEUE_KEY: &str = "medicenso_sync_queue";
/// Operations removed from the queue because they can never succeed
pub const FAILED_KEY: &str = "medicenso_sync_failed";

/// Pending-operation queue.
///
/// `enqueue` returns only after the entry is durably stored. Only the sync
/// engine removes entries, and only from the front.
#[derive(Clone)]
pub struct PendingQueue {
    storage: DeviceStorage,
}

impl PendingQueue {
    pub const fn new(storage: DeviceStorage) -> Self {
        Self { storage }
    }

    pub async fn enqueue(&self, operation: PendingOperation) -> Result<()> {
        let guard = self.storage.lock().await;
        Self::enqueue_in(&guard, operation).await
    }

    /// All queued operations, oldest first.
    pub async fn peek_all(&self) -> Vec<PendingOperation> {
        let guard = self.storage.lock().await;
        Self::peek_all_in(&guard).await
    }

    /// The oldest queued operation.
    pub async fn front(&self) -> Option<PendingOperation> {
        self.peek_all().await.into_iter().next()
    }

    /// Remove the oldest operation once it has been applied remotely.
    ///
    /// Does nothing unless the front entry is `expected`, so a stale caller
    /// can never remove an operation it did not process.
    pub async fn dequeue_front(&self, expected: Uuid) -> Result<bool> {
        let guard = self.storage.lock().await;
        let mut operations = Self::load_in(&guard).await?;

        if operations.first().is_none_or(|front| front.id != expected) {
            return Ok(false);
        }

        operations.remove(0);
        guard.write_sequence(QUEUE_KEY, &operations).await?;
        Ok(true)
    }

    /// Number of queued operations (the user-visible pending count).
    pub async fn len(&self) -> usize {
        self.peek_all().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Move the front operation to the failed log.
    pub async fn park(&self, operation: &PendingOperation, reason: impl Into<String>) -> Result<()> {
        let guard = self.storage.lock().await;
        let mut operations = Self::load_in(&guard).await?;
        if operations.first().is_some_and(|front| front.id == operation.id) {
            operations.remove(0);
        }

        let mut parked: Vec<ParkedOperation> = guard.try_read_sequence(FAILED_KEY).await?;
        parked.push(ParkedOperation {
            operation: operation.clone(),
            reason: reason.into(),
            parked_at: Utc::now(),
        });

        guard.write_sequence(FAILED_KEY, &parked).await?;
        guard.write_sequence(QUEUE_KEY, &operations).await
    }

    /// Operations moved out of the queue as unrecoverable, oldest first.
    pub async fn parked(&self) -> Vec<ParkedOperation> {
        let guard = self.storage.lock().await;
        guard.read_sequence(FAILED_KEY).await
    }

    /// Forget parked operations. Returns how many were removed.
    pub async fn clear_parked(&self) -> Result<usize> {
        let guard = self.storage.lock().await;
        let parked: Vec<ParkedOperation> = guard.read_sequence(FAILED_KEY).await;
        guard.remove(FAILED_KEY).await?;
        Ok(parked.len())
    }

    pub(crate) async fn enqueue_in(
        guard: &StorageGuard<'_>,
        operation: PendingOperation,
    ) -> Result<()> {
        let mut operations = Self::load_in(guard).await?;
        tracing::debug!("Queued {}", operation.describe());
        operations.push(operation);
        guard.write_sequence(QUEUE_KEY, &operations).await
    }

    async fn peek_all_in(guard: &StorageGuard<'_>) -> Vec<PendingOperation> {
        guard.read_sequence(QUEUE_KEY).await
    }

    /// Queued operations, or the storage error that hid them.
    pub(crate) async fn load_in(guard: &StorageGuard<'_>) -> Result<Vec<PendingOperation>> {
        guard.try_read_sequence(QUEUE_KEY).await
    }
}
