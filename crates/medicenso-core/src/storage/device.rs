//! Shared device storage handle used by the local store and the sync queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::db::{Database, KeyValueRepository, LibSqlKeyValueRepository};
use crate::Result;

/// Thread-safe handle to the device's key-value database.
///
/// Each call is atomic on its own. Use [`DeviceStorage::lock`] when a
/// read-modify-write must not interleave with other writers.
#[derive(Clone)]
pub struct DeviceStorage {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DeviceStorage {
    /// Open device storage at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one is created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Device database at {} is unreadable: {}. Quarantining and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open in-memory device storage (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, if this storage is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Take exclusive access for a multi-step update.
    pub async fn lock(&self) -> StorageGuard<'_> {
        StorageGuard {
            db: self.db.lock().await,
        }
    }

    /// Read the raw value stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.lock().await.get(key).await
    }

    /// Store a raw value under `key`.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().await.set(key, value).await
    }

    /// Remove `key`.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.lock().await.remove(key).await
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        ["file is not a database", "malformed"]
            .iter()
            .any(|needle| message.contains(needle))
    }

    /// Rename the database file and its `-wal`/`-shm` sidecars out of the way.
    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let suffix = format!("corrupt-{}", chrono::Utc::now().timestamp_millis());
        for sidecar in ["", "-wal", "-shm"] {
            let mut source = db_path.as_os_str().to_owned();
            source.push(sidecar);
            let source = PathBuf::from(source);
            if !source.exists() {
                continue;
            }

            let mut target = source.as_os_str().to_owned();
            target.push(format!(".{suffix}"));
            std::fs::rename(&source, &target)?;
            tracing::warn!(
                "Moved unreadable device DB file {} aside",
                source.display()
            );
        }
        Ok(())
    }
}

/// Exclusive access to device storage.
pub struct StorageGuard<'a> {
    db: MutexGuard<'a, Database>,
}

impl StorageGuard<'_> {
    fn repo(&self) -> LibSqlKeyValueRepository<'_> {
        LibSqlKeyValueRepository::new(self.db.connection())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.repo().get(key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.repo().set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.repo().remove(key).await
    }

    /// Read a serialized sequence for a read-modify-write.
    ///
    /// A missing key or an unparsable blob reads as empty. A storage error
    /// is returned, so the caller never overwrites data it could not read.
    pub async fn try_read_sequence<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => Ok(items),
            Err(error) => {
                tracing::warn!("Stored '{key}' is corrupt, treating as empty: {error}");
                Ok(Vec::new())
            }
        }
    }

    /// Read a serialized sequence, failing open.
    ///
    /// Like [`Self::try_read_sequence`], but an unreadable database also
    /// reads as empty. Only for display paths that write nothing back.
    pub async fn read_sequence<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.try_read_sequence(key).await.unwrap_or_else(|error| {
            tracing::warn!("Failed to read '{key}' from device storage: {error}");
            Vec::new()
        })
    }

    /// Serialize and durably store a sequence.
    pub async fn write_sequence<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
impl DeviceStorage {
    /// Store a value the repository cannot read back as text.
    pub(crate) async fn plant_unreadable(&self, key: &str) {
        let guard = self.lock().await;
        guard
            .db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, X'00ff', 0)",
                [key],
            )
            .await
            .unwrap();
    }
}
