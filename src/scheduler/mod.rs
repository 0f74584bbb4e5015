//! Scheduler (L11, SPEC_FULL §4.11): periodically polls a fixed set of
//! launchers and enqueues a maintenance job when a launcher's condition
//! holds.
//!
//! Grounded in `jobs::run_worker_loop`'s poll/sleep/cancellation shape,
//! generalized from "claim the next queued job" to "check every launcher's
//! condition, enqueue if true".

pub mod artifacts;
pub mod launchers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::jobs::{cancel::sleep_cancellable, CancellationToken, JobError, JobQueue};
use crate::metrics::MetricsError;
use crate::objectstore::ObjectStorageError;
use crate::projection::ProjectionError;
use crate::vocabulary::StoreError as VocabularyStoreError;

pub use artifacts::{ArtifactsError, ArtifactsResult, ArtifactsStore};
pub use launchers::{
    ArtifactCleanupLauncher, CategoryRefreshLauncher, EpistemicRemeasurementLauncher, ProjectionLauncher,
    VocabConsolidationLauncher,
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job queue error: {0}")]
    Job(#[from] JobError),
    #[error("artifacts store error: {0}")]
    Artifacts(#[from] ArtifactsError),
    #[error("vocabulary store error: {0}")]
    Vocabulary(#[from] VocabularyStoreError),
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
    #[error("object storage error: {0}")]
    ObjectStorage(#[from] ObjectStorageError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// A single maintenance condition the scheduler polls (§4.11). Implementors
/// check a condition over the current graph/vocabulary/metrics state, then
/// build the payload for the job that condition enqueues.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Human-readable name, used only for logging.
    fn name(&self) -> &'static str;

    /// The job type this launcher enqueues (one of `jobs::{VOCAB_CONSOLIDATE,
    /// VOCAB_REFRESH, EPISTEMIC_REMEASUREMENT, PROJECTION, ARTIFACT_CLEANUP}`).
    fn job_type(&self) -> &'static str;

    /// Whether the condition currently holds. Side-effect-free except for
    /// launchers that cache the result of this check for `prepare_job_data`.
    async fn check_conditions(&self) -> SchedulerResult<bool>;

    /// The job payload to enqueue, called only immediately after
    /// `check_conditions` returned `true`.
    async fn prepare_job_data(&self) -> SchedulerResult<Value>;
}

/// Default retry budget for scheduler-enqueued maintenance jobs (§4.10).
const MAINTENANCE_MAX_RETRIES: i64 = 3;

/// Polls a fixed set of launchers on an interval and enqueues a job for
/// every one whose condition currently holds.
///
/// Per §4.11: "Any exception propagates to the scheduler, which retries
/// with backoff and, if persistent, notifies an operator but never marks
/// the launcher itself failed beyond the current tick" — a single
/// launcher's error is logged and skipped, it never aborts the tick for
/// the remaining launchers.
pub struct Scheduler {
    launchers: Vec<Arc<dyn Launcher>>,
    jobs: Arc<JobQueue>,
}

impl Scheduler {
    pub fn new(jobs: Arc<JobQueue>) -> Self {
        Self { launchers: Vec::new(), jobs }
    }

    pub fn register(&mut self, launcher: Arc<dyn Launcher>) {
        self.launchers.push(launcher);
    }

    /// Check every registered launcher once, enqueueing a job for each one
    /// whose condition holds. A launcher that errors is logged and skipped;
    /// it never fails the whole tick.
    pub async fn tick(&self) {
        for launcher in &self.launchers {
            match launcher.check_conditions().await {
                Ok(true) => match launcher.prepare_job_data().await {
                    Ok(data) => match self.jobs.enqueue(launcher.job_type(), data, MAINTENANCE_MAX_RETRIES) {
                        Ok(job_id) => info!(launcher = launcher.name(), job_id, "enqueued maintenance job"),
                        Err(err) => error!(launcher = launcher.name(), error = %err, "failed to enqueue maintenance job"),
                    },
                    Err(err) => error!(launcher = launcher.name(), error = %err, "failed to prepare job data"),
                },
                Ok(false) => {}
                Err(err) => error!(launcher = launcher.name(), error = %err, "launcher condition check failed"),
            }
        }
    }

    /// Runs `tick()` on a fixed interval until `token` is cancelled.
    pub async fn run(&self, interval: Duration, token: &CancellationToken) {
        while !token.is_cancelled() {
            self.tick().await;
            sleep_cancellable(interval, token).await;
        }
    }
}
