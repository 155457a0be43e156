//! Versioned schema for the device database

use libsql::Connection;

use crate::error::Result;

/// Ordered schema steps; each entry moves the schema to its version.
const STEPS: &[(i32, &[&str])] = &[(
    1,
    &[
        // One serialized blob per fixed storage key
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    ],
)];

/// Newest schema version this build knows.
pub const LATEST_VERSION: i32 = 1;

/// Bring the schema up to [`LATEST_VERSION`].
pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let current = schema_version(conn).await?;
    for (version, statements) in STEPS.iter().filter(|(version, _)| *version > current) {
        apply(conn, *version, statements).await?;
        tracing::info!("Device database schema now at version {version}");
    }
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.transaction().await?;
    for statement in statements {
        tx.execute(statement, ()).await?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use libsql::Builder;

    use super::*;

    async fn fresh() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_database_reaches_latest_version() {
        let conn = fresh().await;
        run(&conn).await.unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), LATEST_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rerunning_applies_nothing_twice() {
        let conn = fresh().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let applied: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(applied, i64::from(LATEST_VERSION));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kv_store_accepts_rows_after_migration() {
        let conn = fresh().await;
        run(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ('k', '[]', 0)",
            (),
        )
        .await
        .unwrap();
        let mut rows = conn
            .query("SELECT value FROM kv_store WHERE key = 'k'", ())
            .await
            .unwrap();
        let value: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(value, "[]");
    }
}
