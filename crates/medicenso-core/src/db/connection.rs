//! Device database connection

use std::path::Path;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::Result;

/// Pragmas applied on open. A write is durable once its call returns.
const DURABILITY_PRAGMAS: [&str; 2] = ["PRAGMA journal_mode = WAL", "PRAGMA synchronous = FULL"];

/// Device-local libSQL database with the schema applied
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new_local(path.as_ref()).build().await?;
        Self::prepare(db).await
    }

    /// Open a throwaway in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::prepare(db).await
    }

    async fn prepare(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        for pragma in DURABILITY_PRAGMAS {
            // in-memory databases refuse WAL
            if let Err(error) = conn.execute(pragma, ()).await {
                tracing::debug!("Ignoring `{pragma}`: {error}");
            }
        }
        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
