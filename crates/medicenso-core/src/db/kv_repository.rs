//! Key-value repository implementation

use crate::error::Result;
use libsql::Connection;

/// Trait for flat key-namespaced storage (async)
#[allow(async_fn_in_trait)]
pub trait KeyValueRepository {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// libSQL implementation of `KeyValueRepository`
pub struct LibSqlKeyValueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlKeyValueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl KeyValueRepository for LibSqlKeyValueRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv_store WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)",
                libsql::params![key, value, chrono::Utc::now().timestamp_millis()],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_key_is_none() {
        let db = setup().await;
        let repo = LibSqlKeyValueRepository::new(db.connection());

        assert_eq!(repo.get("medicenso_cache_reports").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_replaces_value() {
        let db = setup().await;
        let repo = LibSqlKeyValueRepository::new(db.connection());

        repo.set("k", "[1]").await.unwrap();
        repo.set("k", "[1,2]").await.unwrap();

        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("[1,2]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlKeyValueRepository::new(db.connection());

        repo.set("k", "v").await.unwrap();
        repo.remove("k").await.unwrap();
        repo.remove("k").await.unwrap();

        assert_eq!(repo.get("k").await.unwrap(), None);
    }
}
