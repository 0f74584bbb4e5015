//! Projection Cache (L14, SPEC_FULL §4.14): the caching contract around an
//! externally computed 2D/3D layout (t-SNE, UMAP) of an ontology's concepts.
//!
//! No teacher analogue; built on the object-storage client (L3) the way
//! `objectstore::client` itself is built — `reqwest` + typed `thiserror`
//! errors, `tracing` at the same granularity as `ObjectStorageClient`.

use crate::objectstore::{projection_history_key, projection_latest_key, ObjectStorageClient, ObjectStorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("object storage error: {0}")]
    ObjectStorage(#[from] ObjectStorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Summary statistics cached alongside the layout so the `projection`
/// launcher (§4.11) can decide staleness without recomputing anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionStatistics {
    pub concept_count: u64,
    pub edge_count: u64,
}

/// A cached projection snapshot (§4.14). `changelist_id` is the ETag-style
/// token conditional reads compare against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionDataset {
    pub changelist_id: String,
    pub ontology: String,
    pub embedding_source: String,
    pub statistics: ProjectionStatistics,
    pub points: Vec<ProjectionPoint>,
    pub computed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionPoint {
    pub concept_id: String,
    pub x: f32,
    pub y: f32,
}

/// Result of a conditional read (§4.14: "304 if unchanged").
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionFetch {
    Fresh(ProjectionDataset),
    NotModified,
    Absent,
}

pub struct ProjectionCache {
    client: ObjectStorageClient,
}

impl ProjectionCache {
    pub fn new(client: ObjectStorageClient) -> Self {
        Self { client }
    }

    /// `get_projection(ontology, embedding_source)` (§4.14). `if_changelist_id`,
    /// when given, makes this a conditional read: a match returns
    /// `NotModified` without re-deserializing the payload.
    pub async fn get_projection(
        &self,
        ontology: &str,
        embedding_source: &str,
        if_changelist_id: Option<&str>,
    ) -> ProjectionResult<ProjectionFetch> {
        let key = projection_latest_key(ontology, embedding_source);
        let bytes = match self.client.get(&key).await {
            Ok(bytes) => bytes,
            Err(ObjectStorageError::NotFound(_)) => return Ok(ProjectionFetch::Absent),
            Err(err) => return Err(err.into()),
        };
        let dataset: ProjectionDataset = serde_json::from_slice(&bytes)?;
        if if_changelist_id == Some(dataset.changelist_id.as_str()) {
            return Ok(ProjectionFetch::NotModified);
        }
        Ok(ProjectionFetch::Fresh(dataset))
    }

    /// Writes both `latest.json` and a timestamped history snapshot on
    /// completion of a projection worker job (§4.14).
    pub async fn put_projection(&self, dataset: &ProjectionDataset, timestamp: &str) -> ProjectionResult<()> {
        let body = serde_json::to_vec(dataset)?;
        let latest_key = projection_latest_key(&dataset.ontology, &dataset.embedding_source);
        let history_key = projection_history_key(&dataset.ontology, &dataset.embedding_source, timestamp);

        self.client.put(&latest_key, body.clone(), "application/json").await?;
        self.client.put(&history_key, body, "application/json").await?;
        info!(ontology = %dataset.ontology, embedding_source = %dataset.embedding_source, "projection cached");
        Ok(())
    }

    /// `DELETE /projection/{ontology}` (§4.14): deletes only `latest.json`,
    /// history snapshots are retained for later inspection.
    pub async fn invalidate(&self, ontology: &str, embedding_source: &str) -> ProjectionResult<()> {
        let key = projection_latest_key(ontology, embedding_source);
        self.client.delete(&key).await?;
        debug!(ontology, embedding_source, "projection invalidated");
        Ok(())
    }

    /// Staleness check backing the `projection` launcher (§4.11): stale if
    /// the cache is absent or the concept count has drifted by at least 5.
    pub fn is_stale(cached: Option<&ProjectionStatistics>, current_concept_count: u64) -> bool {
        match cached {
            None => true,
            Some(stats) => current_concept_count.abs_diff(stats.concept_count) >= 5,
        }
    }
}
