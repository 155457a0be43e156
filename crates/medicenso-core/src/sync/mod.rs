//! Offline-first synchronization: the pending queue and the engine that
//! drains it against the remote store.

mod connectivity;
mod engine;
mod queue;

pub use connectivity::Connectivity;
pub use engine::{DrainOutcome, DrainReport, SyncEngine};
pub use queue::{PendingQueue, FAILED_KEY, QUEUE_KEY};

/// Sync indicator state shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Syncing,
    /// Online with operations waiting for the next drain
    Pending,
    Synced,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Pending => "pending",
            Self::Synced => "synced",
        };
        f.write_str(label)
    }
}

/// Snapshot of sync progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Operations waiting in the queue
    pub pending: usize,
    /// Operations moved to the failed log
    pub parked: usize,
}
