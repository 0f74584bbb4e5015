//! Backing store for the `artifact_cleanup` launcher's condition (§4.11):
//! a minimal relational table of ephemeral artifacts (projection history
//! snapshots, stale checkpoints, anything else with a TTL) with an
//! `expires_at` column. No teacher or spec table of this shape exists yet,
//! so this follows the same `rusqlite` + `Mutex<Connection>` shape as
//! `metrics::GraphMetrics` and `jobs::JobQueue`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactsError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type ArtifactsResult<T> = Result<T, ArtifactsError>;

/// One tracked artifact key and the time at which it becomes eligible for
/// cleanup.
pub struct ArtifactsStore {
    conn: Mutex<Connection>,
}

impl ArtifactsStore {
    pub fn open(path: impl AsRef<Path>) -> ArtifactsResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> ArtifactsResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> ArtifactsResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS artifacts (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Register a new artifact with a TTL.
    pub fn record(&self, key: &str, kind: &str, expires_at: DateTime<Utc>) -> ArtifactsResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO artifacts (key, kind, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, kind, Utc::now().to_rfc3339(), expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Count of rows with `expires_at < now` (§4.11's `artifact_cleanup` condition).
    pub fn count_expired(&self, now: DateTime<Utc>) -> ArtifactsResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE expires_at < ?1",
            params![now.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn list_expired(&self, now: DateTime<Utc>) -> ArtifactsResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key FROM artifacts WHERE expires_at < ?1 ORDER BY expires_at ASC")?;
        let rows = stmt.query_map(params![now.to_rfc3339()], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ArtifactsError::from)
    }

    pub fn delete(&self, key: &str) -> ArtifactsResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM artifacts WHERE key = ?1", params![key])?;
        Ok(())
    }
}
