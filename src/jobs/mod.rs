//! Job Queue (L10, SPEC_FULL §4.10): a persisted FIFO of maintenance and
//! ingestion work, with approval gating, retry/cooldown, and a pluggable
//! worker registry.
//!
//! Schema and row-mapping style follow `vocabulary::store::VocabularyStore`
//! and `metrics::GraphMetrics` (`rusqlite` + `Mutex<Connection>`).
//! Cancellation is the teacher's `adapter::cancel::CancellationToken`
//! (`jobs::cancel`), generalized from one in-flight adapter run to the
//! worker loop's outer poll.

pub mod cancel;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

pub use cancel::{sleep_cancellable, CancellationToken};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("date parsing error: {0}")]
    DateParse(String),
    #[error("job not found: {0}")]
    NotFound(String),
}

pub type JobResult<T> = Result<T, JobError>;

/// Built-in worker type names (§4.10).
pub const INGESTION: &str = "ingestion";
pub const VOCAB_CONSOLIDATE: &str = "vocab_consolidate";
pub const VOCAB_REFRESH: &str = "vocab_refresh";
pub const EPISTEMIC_REMEASUREMENT: &str = "epistemic_remeasurement";
pub const PROJECTION: &str = "projection";
pub const SOURCE_EMBEDDING: &str = "source_embedding";
pub const ARTIFACT_CLEANUP: &str = "artifact_cleanup";
pub const PROPOSAL_EXECUTION: &str = "proposal_execution";

/// Job types the scheduler (L11) enqueues itself and that are therefore
/// auto-approved on arrival (§4.10: "maintenance jobs auto-approved at
/// enqueue with approved_by=\"system\""). Everything else (ingestion,
/// source embedding backfills, proposal execution) waits for an explicit
/// `approve()`.
pub const MAINTENANCE_JOB_TYPES: &[&str] =
    &[VOCAB_CONSOLIDATE, VOCAB_REFRESH, EPISTEMIC_REMEASUREMENT, PROJECTION, ARTIFACT_CLEANUP];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Approved,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Approved => "approved",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "approved" => Ok(JobStatus::Approved),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A queued unit of work (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub data: Value,
    pub status: JobStatus,
    pub progress: f32,
    pub stats: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retries: i64,
    pub max_retries: i64,
    pub error: Option<String>,
}

/// What happened to a job after its worker reported failure (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Requeued,
    Failed,
}

pub struct JobQueue {
    conn: Mutex<Connection>,
}

impl JobQueue {
    pub fn open(path: impl AsRef<Path>) -> JobResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> JobResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> JobResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                data TEXT NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0.0,
                stats TEXT,
                created_at TEXT NOT NULL,
                approved_at TEXT,
                approved_by TEXT,
                started_at TEXT,
                finished_at TEXT,
                retries INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                error TEXT,
                next_attempt_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_type ON jobs(job_type);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Enqueue a job (§4.10). Maintenance job types are auto-approved with
    /// `approved_by = "system"`; everything else starts `queued`.
    pub fn enqueue(&self, job_type: &str, data: Value, max_retries: i64) -> JobResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let is_maintenance = MAINTENANCE_JOB_TYPES.contains(&job_type);
        let now = Utc::now().to_rfc3339();
        let status = if is_maintenance { JobStatus::Approved } else { JobStatus::Queued };
        let approved_at = is_maintenance.then(|| now.clone());
        let approved_by = is_maintenance.then(|| "system".to_string());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (id, job_type, data, status, progress, stats, created_at, approved_at, approved_by,
                                started_at, finished_at, retries, max_retries, error, next_attempt_at)
             VALUES (?1, ?2, ?3, ?4, 0.0, NULL, ?5, ?6, ?7, NULL, NULL, 0, ?8, NULL, NULL)",
            params![id, job_type, serde_json::to_string(&data)?, status.as_str(), now, approved_at, approved_by, max_retries],
        )?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> JobResult<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn get_locked(conn: &Connection, id: &str) -> JobResult<Option<Job>> {
        conn.query_row(
            "SELECT id, job_type, data, status, progress, stats, created_at, approved_at, approved_by,
                    started_at, finished_at, retries, max_retries, error
             FROM jobs WHERE id = ?1",
            params![id],
            row_to_job,
        )
        .optional()?
        .transpose()
    }

    /// Approve a queued job for processing (§4.10).
    pub fn approve(&self, id: &str, approved_by: &str) -> JobResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE jobs SET status = ?2, approved_at = ?3, approved_by = ?4
             WHERE id = ?1 AND status = 'queued'",
            params![id, JobStatus::Approved.as_str(), now, approved_by],
        )?;
        Ok(updated > 0)
    }

    /// Persist incremental progress (§4.13's "progress persisted every
    /// chunk boundary for resume").
    pub fn update_progress(&self, id: &str, progress: f32, data: Option<&Value>) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        match data {
            Some(data) => {
                conn.execute(
                    "UPDATE jobs SET progress = ?2, data = ?3 WHERE id = ?1",
                    params![id, progress, serde_json::to_string(data)?],
                )?;
            }
            None => {
                conn.execute("UPDATE jobs SET progress = ?2 WHERE id = ?1", params![id, progress])?;
            }
        }
        Ok(())
    }

    /// Claim the oldest approved job whose cooldown (if any) has elapsed,
    /// marking it `processing`. The connection-wide mutex stands in for the
    /// teacher's `SELECT ... FOR UPDATE SKIP LOCKED` (§4.10): only one
    /// thread can observe and flip a row at a time.
    pub fn claim_next(&self) -> JobResult<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM jobs
                 WHERE status = 'approved' AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                 ORDER BY created_at ASC LIMIT 1",
                params![now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = id else { return Ok(None) };
        conn.execute(
            "UPDATE jobs SET status = 'processing', started_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Self::get_locked(&conn, &id)
    }

    /// Mark a job completed (§4.10).
    pub fn complete(&self, id: &str, stats: Option<Value>) -> JobResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE jobs SET status = 'completed', progress = 1.0, finished_at = ?2, stats = ?3 WHERE id = ?1",
            params![id, now, stats.map(|s| serde_json::to_string(&s)).transpose()?],
        )?;
        Ok(())
    }

    /// On worker failure: re-queue with an exponential cooldown if retries
    /// remain, else mark failed (§4.10).
    pub fn fail_or_retry(&self, id: &str, error: &str) -> JobResult<FailureOutcome> {
        let conn = self.conn.lock().unwrap();
        let Some(job) = Self::get_locked(&conn, id)? else { return Err(JobError::NotFound(id.to_string())) };

        if job.retries < job.max_retries {
            let next_attempt = Utc::now() + chrono::Duration::from_std(backoff_for(job.retries)).unwrap();
            conn.execute(
                "UPDATE jobs SET status = 'approved', retries = retries + 1, error = ?2,
                                  next_attempt_at = ?3, started_at = NULL
                 WHERE id = ?1",
                params![id, error, next_attempt.to_rfc3339()],
            )?;
            Ok(FailureOutcome::Requeued)
        } else {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE jobs SET status = 'failed', error = ?2, finished_at = ?3 WHERE id = ?1",
                params![id, error, now],
            )?;
            Ok(FailureOutcome::Failed)
        }
    }

    pub fn list_by_status(&self, status: JobStatus) -> JobResult<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_type, data, status, progress, stats, created_at, approved_at, approved_by,
                    started_at, finished_at, retries, max_retries, error
             FROM jobs WHERE status = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![status.as_str()], row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }

    /// Delete every job whose `data.ontology` (or `data.ontology_name`)
    /// equals `ontology_name` (§4.7's ontology-delete cascade, §4.10).
    pub fn delete_jobs_by_ontology(&self, ontology_name: &str) -> JobResult<usize> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, data FROM jobs")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((id, data))
        })?;

        let mut to_delete = Vec::new();
        for row in rows {
            let (id, data) = row?;
            let parsed: Value = serde_json::from_str(&data)?;
            let matches = parsed
                .get("ontology")
                .or_else(|| parsed.get("ontology_name"))
                .and_then(Value::as_str)
                .map(|s| s == ontology_name)
                .unwrap_or(false);
            if matches {
                to_delete.push(id);
            }
        }

        for id in &to_delete {
            conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        }
        Ok(to_delete.len())
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobResult<Job>> {
    let id: String = row.get(0)?;
    let job_type: String = row.get(1)?;
    let data: String = row.get(2)?;
    let status: String = row.get(3)?;
    let progress: f32 = row.get(4)?;
    let stats: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let approved_at: Option<String> = row.get(7)?;
    let approved_by: Option<String> = row.get(8)?;
    let started_at: Option<String> = row.get(9)?;
    let finished_at: Option<String> = row.get(10)?;
    let retries: i64 = row.get(11)?;
    let max_retries: i64 = row.get(12)?;
    let error: Option<String> = row.get(13)?;

    Ok(build_job(
        id, job_type, data, status, progress, stats, created_at, approved_at, approved_by, started_at, finished_at,
        retries, max_retries, error,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_job(
    id: String,
    job_type: String,
    data: String,
    status: String,
    progress: f32,
    stats: Option<String>,
    created_at: String,
    approved_at: Option<String>,
    approved_by: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
    retries: i64,
    max_retries: i64,
    error: Option<String>,
) -> JobResult<Job> {
    Ok(Job {
        id,
        job_type,
        data: serde_json::from_str(&data)?,
        status: status.parse().map_err(JobError::DateParse)?,
        progress,
        stats: stats.map(|s| serde_json::from_str(&s)).transpose()?,
        created_at: parse_rfc3339(&created_at)?,
        approved_at: approved_at.map(|s| parse_rfc3339(&s)).transpose()?,
        approved_by,
        started_at: started_at.map(|s| parse_rfc3339(&s)).transpose()?,
        finished_at: finished_at.map(|s| parse_rfc3339(&s)).transpose()?,
        retries,
        max_retries,
        error,
    })
}

fn parse_rfc3339(s: &str) -> JobResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).map_err(|e| JobError::DateParse(e.to_string()))
}

/// Exponential cooldown before a retried job becomes claimable again,
/// capped at 5 minutes.
fn backoff_for(retries: i64) -> Duration {
    let base_secs = 2u64.saturating_pow(retries.clamp(0, 8) as u32);
    Duration::from_secs(base_secs.min(300))
}

/// A registered handler for one job type (§4.10: "pluggable `type ->
/// worker_fn(data, id, queue)` map").
#[async_trait]
pub trait JobWorker: Send + Sync {
    async fn run(&self, job: &Job, queue: &JobQueue) -> Result<(), String>;
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn JobWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, worker: Arc<dyn JobWorker>) {
        self.workers.insert(job_type.into(), worker);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobWorker>> {
        self.workers.get(job_type).cloned()
    }
}

/// Cancellation-aware worker loop (§4.10, §5): claim an approved job, run
/// its registered worker, complete/retry/fail, repeat until cancelled. A
/// job type with no registered worker fails immediately without consuming
/// a retry budget cycle's worth of cooldown, since no amount of waiting
/// will make a worker appear.
pub async fn run_worker_loop(
    queue: Arc<JobQueue>,
    registry: Arc<WorkerRegistry>,
    cancellation: CancellationToken,
    poll_interval: Duration,
) {
    loop {
        if cancellation.is_cancelled() {
            return;
        }
        match queue.claim_next() {
            Ok(Some(job)) => match registry.get(&job.job_type) {
                Some(worker) => match worker.run(&job, &queue).await {
                    Ok(()) => {
                        if let Err(err) = queue.complete(&job.id, None) {
                            tracing::warn!(job_id = %job.id, error = %err, "failed to mark job completed");
                        }
                    }
                    Err(err) => {
                        if let Err(db_err) = queue.fail_or_retry(&job.id, &err) {
                            tracing::warn!(job_id = %job.id, error = %db_err, "failed to record job failure");
                        }
                    }
                },
                None => {
                    tracing::warn!(job_type = %job.job_type, "no worker registered");
                    let _ = queue.fail_or_retry(&job.id, "no worker registered for this job type");
                }
            },
            Ok(None) => sleep_cancellable(poll_interval, &cancellation).await,
            Err(err) => {
                tracing::warn!(error = %err, "job queue poll failed");
                sleep_cancellable(poll_interval, &cancellation).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_maintenance_job_is_auto_approved() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 3).unwrap();
        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Approved);
        assert_eq!(job.approved_by.as_deref(), Some("system"));
    }

    #[test]
    fn enqueue_ingestion_job_starts_queued() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(INGESTION, serde_json::json!({"ontology": "acme"}), 3).unwrap();
        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.approved_by.is_none());
    }

    #[test]
    fn approve_moves_queued_job_to_approved() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(INGESTION, serde_json::json!({}), 3).unwrap();
        assert!(queue.approve(&id, "alice").unwrap());
        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Approved);
        assert_eq!(job.approved_by.as_deref(), Some("alice"));
    }

    #[test]
    fn approve_is_a_no_op_on_non_queued_job() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 3).unwrap();
        assert!(!queue.approve(&id, "alice").unwrap());
    }

    #[test]
    fn claim_next_picks_oldest_approved_job() {
        let queue = JobQueue::open_in_memory().unwrap();
        let first = queue.enqueue(VOCAB_REFRESH, serde_json::json!({"n": 1}), 3).unwrap();
        let _second = queue.enqueue(VOCAB_REFRESH, serde_json::json!({"n": 2}), 3).unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Processing);
    }

    #[test]
    fn claim_next_skips_unapproved_jobs() {
        let queue = JobQueue::open_in_memory().unwrap();
        queue.enqueue(INGESTION, serde_json::json!({}), 3).unwrap();
        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn complete_sets_terminal_status_and_progress() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 3).unwrap();
        queue.claim_next().unwrap();
        queue.complete(&id, Some(serde_json::json!({"updated": 4}))).unwrap();

        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.stats.unwrap()["updated"], 4);
    }

    #[test]
    fn fail_or_retry_requeues_while_retries_remain() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 2).unwrap();
        queue.claim_next().unwrap();

        let outcome = queue.fail_or_retry(&id, "transient failure").unwrap();
        assert_eq!(outcome, FailureOutcome::Requeued);

        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Approved);
        assert_eq!(job.retries, 1);
        assert_eq!(job.error.as_deref(), Some("transient failure"));
    }

    #[test]
    fn fail_or_retry_fails_once_retry_budget_exhausted() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 0).unwrap();
        queue.claim_next().unwrap();

        let outcome = queue.fail_or_retry(&id, "fatal").unwrap();
        assert_eq!(outcome, FailureOutcome::Failed);

        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn requeued_job_is_not_claimable_until_cooldown_elapses() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 3).unwrap();
        queue.claim_next().unwrap();
        queue.fail_or_retry(&id, "oops").unwrap();

        assert!(queue.claim_next().unwrap().is_none(), "cooldown hasn't elapsed yet");
    }

    #[test]
    fn update_progress_persists_progress_and_data() {
        let queue = JobQueue::open_in_memory().unwrap();
        let id = queue.enqueue(INGESTION, serde_json::json!({"resume_from_chunk": 0}), 3).unwrap();
        queue.update_progress(&id, 0.5, Some(&serde_json::json!({"resume_from_chunk": 12}))).unwrap();

        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.progress, 0.5);
        assert_eq!(job.data["resume_from_chunk"], 12);
    }

    #[test]
    fn delete_jobs_by_ontology_removes_only_matching_jobs() {
        let queue = JobQueue::open_in_memory().unwrap();
        queue.enqueue(INGESTION, serde_json::json!({"ontology": "acme"}), 3).unwrap();
        queue.enqueue(INGESTION, serde_json::json!({"ontology": "other"}), 3).unwrap();

        let deleted = queue.delete_jobs_by_ontology("acme").unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(queue.list_by_status(JobStatus::Queued).unwrap().len(), 1);
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl JobWorker for AlwaysSucceeds {
        async fn run(&self, _job: &Job, _queue: &JobQueue) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_loop_completes_a_job_then_stops_on_cancellation() {
        let queue = Arc::new(JobQueue::open_in_memory().unwrap());
        let id = queue.enqueue(VOCAB_REFRESH, serde_json::json!({}), 3).unwrap();

        let mut registry = WorkerRegistry::new();
        registry.register(VOCAB_REFRESH, Arc::new(AlwaysSucceeds));
        let registry = Arc::new(registry);

        let cancellation = CancellationToken::new();
        let cancellation_clone = cancellation.clone();
        let queue_clone = queue.clone();
        let handle = tokio::spawn(async move {
            run_worker_loop(queue_clone, registry, cancellation_clone, Duration::from_millis(10)).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancellation.cancel();
        handle.await.unwrap();

        let job = queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
