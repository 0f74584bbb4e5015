//! The five canonical launchers (§4.11). Each is side-effect-free in
//! `check_conditions` (beyond caching the fact it just computed, so
//! `prepare_job_data` doesn't have to recompute a possibly-racy condition)
//! and deterministic in `prepare_job_data`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::artifacts::ArtifactsStore;
use super::{Launcher, SchedulerResult};
use crate::graph::{GraphEngine, NodeLabel, VOCABULARY_ONTOLOGY};
use crate::metrics::{GraphMetrics, VOCABULARY_CHANGE_COUNTER};
use crate::projection::{ProjectionCache, ProjectionFetch};
use crate::vocabulary::VocabularyStore;

/// `artifact_cleanup`: fires daily when at least one row in the artifacts
/// table has expired (§4.11).
pub struct ArtifactCleanupLauncher {
    artifacts: Arc<ArtifactsStore>,
}

impl ArtifactCleanupLauncher {
    pub fn new(artifacts: Arc<ArtifactsStore>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl Launcher for ArtifactCleanupLauncher {
    fn name(&self) -> &'static str {
        "artifact_cleanup"
    }

    fn job_type(&self) -> &'static str {
        crate::jobs::ARTIFACT_CLEANUP
    }

    async fn check_conditions(&self) -> SchedulerResult<bool> {
        Ok(self.artifacts.count_expired(Utc::now())? > 0)
    }

    async fn prepare_job_data(&self) -> SchedulerResult<Value> {
        let expired = self.artifacts.list_expired(Utc::now())?;
        Ok(json!({ "artifact_keys": expired }))
    }
}

/// `category_refresh`: fires every 6h when any active VocabType's category
/// was computed by the probabilistic categorizer rather than asserted by a
/// caller (§4.5.1's `category_source`). The spec's condition names the
/// sentinel category value `llm_generated`, which is the caller-supplied
/// category that *triggers* the categorizer; once resolved, the row's
/// persisted `category_source` reads `"computed"` — that is the signal this
/// launcher actually checks.
pub struct CategoryRefreshLauncher {
    vocabulary_store: Arc<VocabularyStore>,
}

impl CategoryRefreshLauncher {
    pub fn new(vocabulary_store: Arc<VocabularyStore>) -> Self {
        Self { vocabulary_store }
    }
}

#[async_trait]
impl Launcher for CategoryRefreshLauncher {
    fn name(&self) -> &'static str {
        "category_refresh"
    }

    fn job_type(&self) -> &'static str {
        crate::jobs::VOCAB_REFRESH
    }

    async fn check_conditions(&self) -> SchedulerResult<bool> {
        let rows = self.vocabulary_store.list_all()?;
        Ok(rows.iter().any(|r| r.is_active && r.category_source == "computed"))
    }

    async fn prepare_job_data(&self) -> SchedulerResult<Value> {
        let rows = self.vocabulary_store.list_all()?;
        let categories: std::collections::BTreeSet<String> = rows
            .into_iter()
            .filter(|r| r.is_active && r.category_source == "computed")
            .map(|r| r.category)
            .collect();
        Ok(json!({ "categories": categories.into_iter().collect::<Vec<_>>() }))
    }
}

/// `vocab_consolidation`: fires every 12h on a hysteresis band over the
/// inactive/active ratio (§4.11): above 0.20 starts consolidating, below
/// 0.10 stops, and the 0.10-0.20 band holds whatever state was last in
/// effect so the launcher doesn't flap at the boundary.
pub struct VocabConsolidationLauncher {
    vocabulary_store: Arc<VocabularyStore>,
    was_consolidating: Mutex<bool>,
}

const VOCAB_CONSOLIDATION_MIN_ACTIVE: usize = 50;
const VOCAB_CONSOLIDATION_HIGH_RATIO: f64 = 0.20;
const VOCAB_CONSOLIDATION_LOW_RATIO: f64 = 0.10;

impl VocabConsolidationLauncher {
    pub fn new(vocabulary_store: Arc<VocabularyStore>) -> Self {
        Self { vocabulary_store, was_consolidating: Mutex::new(false) }
    }
}

#[async_trait]
impl Launcher for VocabConsolidationLauncher {
    fn name(&self) -> &'static str {
        "vocab_consolidation"
    }

    fn job_type(&self) -> &'static str {
        crate::jobs::VOCAB_CONSOLIDATE
    }

    async fn check_conditions(&self) -> SchedulerResult<bool> {
        let rows = self.vocabulary_store.list_all()?;
        let active = rows.iter().filter(|r| r.is_active).count();
        let inactive = rows.iter().filter(|r| !r.is_active).count();

        let mut was_consolidating = self.was_consolidating.lock().unwrap();
        if active < VOCAB_CONSOLIDATION_MIN_ACTIVE {
            *was_consolidating = false;
            return Ok(false);
        }

        let ratio = inactive as f64 / active as f64;
        let decision = if ratio > VOCAB_CONSOLIDATION_HIGH_RATIO {
            true
        } else if ratio < VOCAB_CONSOLIDATION_LOW_RATIO {
            false
        } else {
            *was_consolidating
        };
        *was_consolidating = decision;
        Ok(decision)
    }

    async fn prepare_job_data(&self) -> SchedulerResult<Value> {
        Ok(json!({}))
    }
}

/// `epistemic_remeasurement`: fires when the vocabulary-change counter has
/// drifted past a threshold (default 10) since the last measurement pass
/// (§4.11, §4.12).
pub struct EpistemicRemeasurementLauncher {
    metrics: Arc<GraphMetrics>,
    threshold: i64,
}

impl EpistemicRemeasurementLauncher {
    pub fn new(metrics: Arc<GraphMetrics>) -> Self {
        Self { metrics, threshold: 10 }
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl Launcher for EpistemicRemeasurementLauncher {
    fn name(&self) -> &'static str {
        "epistemic_remeasurement"
    }

    fn job_type(&self) -> &'static str {
        crate::jobs::EPISTEMIC_REMEASUREMENT
    }

    async fn check_conditions(&self) -> SchedulerResult<bool> {
        Ok(self.metrics.get_delta(VOCABULARY_CHANGE_COUNTER)? >= self.threshold)
    }

    async fn prepare_job_data(&self) -> SchedulerResult<Value> {
        Ok(json!({}))
    }
}

/// `projection`: fires hourly when some ontology's current concept count
/// has drifted by at least 5 from its cached projection's statistics, or no
/// cached projection exists yet (§4.11, §4.14). Caches the offending
/// ontology name between `check_conditions` and `prepare_job_data` since
/// finding it requires an object-storage round trip per ontology and the
/// two calls shouldn't each pay that cost independently.
pub struct ProjectionLauncher {
    engine: Arc<GraphEngine>,
    projection_cache: Arc<ProjectionCache>,
    embedding_source: String,
    pending_ontology: Mutex<Option<String>>,
}

impl ProjectionLauncher {
    pub fn new(engine: Arc<GraphEngine>, projection_cache: Arc<ProjectionCache>, embedding_source: impl Into<String>) -> Self {
        Self { engine, projection_cache, embedding_source: embedding_source.into(), pending_ontology: Mutex::new(None) }
    }
}

#[async_trait]
impl Launcher for ProjectionLauncher {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn job_type(&self) -> &'static str {
        crate::jobs::PROJECTION
    }

    async fn check_conditions(&self) -> SchedulerResult<bool> {
        let vocab_ontology = self.engine.ontology_id_for_name(VOCABULARY_ONTOLOGY);
        for ontology_id in self.engine.list_ontology_ids() {
            if ontology_id == vocab_ontology {
                continue;
            }
            let Some(ontology) = self.engine.get_ontology(&ontology_id) else { continue };
            let current_count = ontology.nodes().filter(|n| n.label == NodeLabel::Concept).count() as u64;

            let fetch = self.projection_cache.get_projection(ontology.name.as_str(), &self.embedding_source, None).await?;
            let stale = match fetch {
                ProjectionFetch::Absent => true,
                ProjectionFetch::NotModified => false,
                ProjectionFetch::Fresh(dataset) => current_count.abs_diff(dataset.statistics.concept_count) >= 5,
            };
            if stale {
                *self.pending_ontology.lock().unwrap() = Some(ontology.name.clone());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn prepare_job_data(&self) -> SchedulerResult<Value> {
        let ontology = self.pending_ontology.lock().unwrap().clone();
        Ok(json!({ "ontology": ontology, "embedding_source": self.embedding_source }))
    }
}
