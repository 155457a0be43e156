//! Remote record store.
//!
//! The backend exposes two collections, `reports` and `field_definitions`,
//! through a record-oriented request/response API. The sync engine, the
//! façade and the migration tool only ever talk to it through
//! [`RemoteStore`].

mod memory;
mod supabase;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{FieldDefinition, Report, UserId};

pub use memory::{MemoryRemoteStore, RemoteCall};
pub use supabase::SupabaseRemoteStore;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Record-level access to the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All reports owned by `user`, newest first.
    async fn fetch_reports(&self, user: &UserId) -> RemoteResult<Vec<Report>>;

    /// A single report by canonical id.
    async fn fetch_report(&self, id: &str) -> RemoteResult<Option<Report>>;

    /// Insert reports. Re-inserting an existing id overwrites it.
    async fn insert_reports(&self, reports: &[Report]) -> RemoteResult<()>;

    /// Update the report with `report.id`. A missing row is not an error.
    async fn update_report(&self, report: &Report) -> RemoteResult<()>;

    /// Delete by id. A missing row is not an error.
    async fn delete_report(&self, id: &str) -> RemoteResult<()>;

    /// The field set owned by `user`, ordered by `order`.
    async fn fetch_field_definitions(&self, user: &UserId) -> RemoteResult<Vec<FieldDefinition>>;

    /// Insert field definitions owned by `user`.
    async fn insert_field_definitions(
        &self,
        user: &UserId,
        fields: &[FieldDefinition],
    ) -> RemoteResult<()>;

    /// Delete every field definition owned by `user`.
    async fn delete_field_definitions(&self, user: &UserId) -> RemoteResult<()>;
}

/// Remote store used when no backend is configured.
///
/// Every call fails, so queued work simply stays queued.
#[derive(Debug, Clone, Default)]
pub struct DisconnectedRemoteStore;

impl DisconnectedRemoteStore {
    fn unavailable<T>() -> RemoteResult<T> {
        Err(RemoteError::Unavailable(
            "no remote store is configured".to_string(),
        ))
    }
}

#[async_trait]
impl RemoteStore for DisconnectedRemoteStore {
    async fn fetch_reports(&self, _user: &UserId) -> RemoteResult<Vec<Report>> {
        Self::unavailable()
    }

    async fn fetch_report(&self, _id: &str) -> RemoteResult<Option<Report>> {
        Self::unavailable()
    }

    async fn insert_reports(&self, _reports: &[Report]) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn update_report(&self, _report: &Report) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn delete_report(&self, _id: &str) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn fetch_field_definitions(&self, _user: &UserId) -> RemoteResult<Vec<FieldDefinition>> {
        Self::unavailable()
    }

    async fn insert_field_definitions(
        &self,
        _user: &UserId,
        _fields: &[FieldDefinition],
    ) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn delete_field_definitions(&self, _user: &UserId) -> RemoteResult<()> {
        Self::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnected_store_refuses_every_call() {
        let store = DisconnectedRemoteStore;
        let user: UserId = "user-1".parse().unwrap();

        let error = store.fetch_reports(&user).await.unwrap_err();
        assert!(matches!(error, RemoteError::Unavailable(_)));
        assert!(store.delete_report("x").await.is_err());
        assert!(store.delete_field_definitions(&user).await.is_err());
    }
}
