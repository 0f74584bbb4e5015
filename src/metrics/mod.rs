//! Graph-Change Metrics (L12, SPEC_FULL §4.12).
//!
//! Monotonic counters in a relational table, each with a companion
//! `last_measured_counter`. Launchers (L11) read deltas off these counters
//! to decide whether a maintenance job is warranted, so the table is kept
//! separate from the graph store itself (grounded in the teacher's
//! `AtomicU64` cache-coherence counter in `graph::engine::GraphEngine`,
//! generalized here to a named-counter table backed by SQLite).

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("date parsing error: {0}")]
    DateParse(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// The required-increment counters named in §4.12.
pub const VOCABULARY_CHANGE_COUNTER: &str = "vocabulary_change_counter";
pub const CONCEPT_CREATION_COUNTER: &str = "concept_creation_counter";
pub const RELATIONSHIP_CREATION_COUNTER: &str = "relationship_creation_counter";
pub const DOCUMENT_INGESTION_COUNTER: &str = "document_ingestion_counter";
pub const EPISTEMIC_MEASUREMENT_COUNTER: &str = "epistemic_measurement_counter";

/// Staleness urgency bands off the vocabulary-change delta (§4.12):
/// `>= 50` high, `>= 20` medium, `>= 10` low, else none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub counter: i64,
    pub last_measured_counter: i64,
    pub last_measured_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl MetricRow {
    pub fn delta(&self) -> i64 {
        self.counter - self.last_measured_counter
    }
}

/// Persisted monotonic-counter store (§4.12).
pub struct GraphMetrics {
    conn: Mutex<Connection>,
}

impl GraphMetrics {
    pub fn open(path: impl AsRef<Path>) -> MetricsResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> MetricsResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> MetricsResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_metrics (
                metric TEXT PRIMARY KEY,
                counter INTEGER NOT NULL DEFAULT 0,
                last_measured_counter INTEGER NOT NULL DEFAULT 0,
                last_measured_at TEXT,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn ensure_row(conn: &Connection, metric: &str) -> MetricsResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO graph_metrics (metric, counter, last_measured_counter, last_measured_at, updated_at)
             VALUES (?1, 0, 0, NULL, ?2)",
            params![metric, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Atomic per-row increment: `UPDATE graph_metrics SET counter = counter + 1 WHERE metric = :m` (§5).
    pub fn increment(&self, metric: &str) -> MetricsResult<i64> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, metric)?;
        conn.execute(
            "UPDATE graph_metrics SET counter = counter + 1, updated_at = ?2 WHERE metric = ?1",
            params![metric, chrono::Utc::now().to_rfc3339()],
        )?;
        let counter: i64 = conn.query_row(
            "SELECT counter FROM graph_metrics WHERE metric = ?1",
            params![metric],
            |row| row.get(0),
        )?;
        Ok(counter)
    }

    pub fn get_delta(&self, metric: &str) -> MetricsResult<i64> {
        Ok(self.get_metric(metric)?.map(|r| r.delta()).unwrap_or(0))
    }

    /// `last_measured_counter := counter`, bumps `last_measured_at` (§4.12).
    pub fn mark_measurement_complete(&self, metric: &str) -> MetricsResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, metric)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE graph_metrics SET last_measured_counter = counter, last_measured_at = ?2, updated_at = ?2
             WHERE metric = ?1",
            params![metric, now],
        )?;
        Ok(())
    }

    /// Operator-only: zero both the counter and its measured baseline.
    pub fn reset(&self, metric: &str) -> MetricsResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, metric)?;
        conn.execute(
            "UPDATE graph_metrics SET counter = 0, last_measured_counter = 0, updated_at = ?2 WHERE metric = ?1",
            params![metric, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_metric(&self, metric: &str) -> MetricsResult<Option<MetricRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT counter, last_measured_counter, last_measured_at, updated_at FROM graph_metrics WHERE metric = ?1",
                params![metric],
                |row| {
                    let counter: i64 = row.get(0)?;
                    let last_measured_counter: i64 = row.get(1)?;
                    let last_measured_at: Option<String> = row.get(2)?;
                    let updated_at: String = row.get(3)?;
                    Ok((counter, last_measured_counter, last_measured_at, updated_at))
                },
            )
            .optional()?;

        row.map(|(counter, last_measured_counter, last_measured_at, updated_at)| {
            Ok(MetricRow {
                counter,
                last_measured_counter,
                last_measured_at: last_measured_at
                    .map(|s| parse_rfc3339(&s))
                    .transpose()?,
                updated_at: parse_rfc3339(&updated_at)?,
            })
        })
        .transpose()
    }

    pub fn get_all_metrics(&self) -> MetricsResult<Vec<(String, MetricRow)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT metric, counter, last_measured_counter, last_measured_at, updated_at FROM graph_metrics ORDER BY metric",
        )?;
        let rows = stmt.query_map([], |row| {
            let metric: String = row.get(0)?;
            let counter: i64 = row.get(1)?;
            let last_measured_counter: i64 = row.get(2)?;
            let last_measured_at: Option<String> = row.get(3)?;
            let updated_at: String = row.get(4)?;
            Ok((metric, counter, last_measured_counter, last_measured_at, updated_at))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (metric, counter, last_measured_counter, last_measured_at, updated_at) = row?;
            out.push((
                metric,
                MetricRow {
                    counter,
                    last_measured_counter,
                    last_measured_at: last_measured_at.map(|s| parse_rfc3339(&s)).transpose()?,
                    updated_at: parse_rfc3339(&updated_at)?,
                },
            ));
        }
        Ok(out)
    }

    /// `urgency in {high, medium, low, none}` off the vocabulary-change
    /// delta thresholds 50, 20, 10 (§4.12).
    pub fn get_staleness_info(&self) -> MetricsResult<Urgency> {
        let delta = self.get_delta(VOCABULARY_CHANGE_COUNTER)?;
        Ok(if delta >= 50 {
            Urgency::High
        } else if delta >= 20 {
            Urgency::Medium
        } else if delta >= 10 {
            Urgency::Low
        } else {
            Urgency::None
        })
    }
}

fn parse_rfc3339(s: &str) -> MetricsResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| MetricsError::DateParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_starts_from_zero_and_accumulates() {
        let metrics = GraphMetrics::open_in_memory().unwrap();
        assert_eq!(metrics.increment(CONCEPT_CREATION_COUNTER).unwrap(), 1);
        assert_eq!(metrics.increment(CONCEPT_CREATION_COUNTER).unwrap(), 2);
    }

    #[test]
    fn delta_reflects_unmeasured_increments() {
        let metrics = GraphMetrics::open_in_memory().unwrap();
        for _ in 0..5 {
            metrics.increment(VOCABULARY_CHANGE_COUNTER).unwrap();
        }
        assert_eq!(metrics.get_delta(VOCABULARY_CHANGE_COUNTER).unwrap(), 5);
    }

    #[test]
    fn mark_measurement_complete_resets_delta_to_zero() {
        let metrics = GraphMetrics::open_in_memory().unwrap();
        for _ in 0..12 {
            metrics.increment(VOCABULARY_CHANGE_COUNTER).unwrap();
        }
        metrics.mark_measurement_complete(VOCABULARY_CHANGE_COUNTER).unwrap();
        assert_eq!(metrics.get_delta(VOCABULARY_CHANGE_COUNTER).unwrap(), 0);
        metrics.increment(VOCABULARY_CHANGE_COUNTER).unwrap();
        assert_eq!(metrics.get_delta(VOCABULARY_CHANGE_COUNTER).unwrap(), 1);
    }

    #[test]
    fn staleness_urgency_follows_thresholds() {
        let metrics = GraphMetrics::open_in_memory().unwrap();
        assert_eq!(metrics.get_staleness_info().unwrap(), Urgency::None);
        for _ in 0..10 {
            metrics.increment(VOCABULARY_CHANGE_COUNTER).unwrap();
        }
        assert_eq!(metrics.get_staleness_info().unwrap(), Urgency::Low);
        for _ in 0..10 {
            metrics.increment(VOCABULARY_CHANGE_COUNTER).unwrap();
        }
        assert_eq!(metrics.get_staleness_info().unwrap(), Urgency::Medium);
        for _ in 0..30 {
            metrics.increment(VOCABULARY_CHANGE_COUNTER).unwrap();
        }
        assert_eq!(metrics.get_staleness_info().unwrap(), Urgency::High);
    }

    #[test]
    fn reset_zeroes_both_counter_and_baseline() {
        let metrics = GraphMetrics::open_in_memory().unwrap();
        for _ in 0..5 {
            metrics.increment(CONCEPT_CREATION_COUNTER).unwrap();
        }
        metrics.reset(CONCEPT_CREATION_COUNTER).unwrap();
        let row = metrics.get_metric(CONCEPT_CREATION_COUNTER).unwrap().unwrap();
        assert_eq!(row.counter, 0);
        assert_eq!(row.last_measured_counter, 0);
    }

    #[test]
    fn get_all_metrics_lists_every_touched_counter() {
        let metrics = GraphMetrics::open_in_memory().unwrap();
        metrics.increment(CONCEPT_CREATION_COUNTER).unwrap();
        metrics.increment(DOCUMENT_INGESTION_COUNTER).unwrap();
        let all = metrics.get_all_metrics().unwrap();
        assert_eq!(all.len(), 2);
    }
}
