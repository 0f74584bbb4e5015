//! Typed-relationship edges (§3.2).
//!
//! Edges are never mutated after creation: a merge copies properties onto a
//! fresh edge and deletes the old one (§3.3). There is accordingly no
//! Hebbian reinforcement or weight recomputation here — an edge's
//! provenance is fixed at creation time.

use super::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::graph::node::PropertyValue;

/// Unique identifier for an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EdgeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where an edge's assertion came from (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSource {
    LlmExtraction,
    HumanCuration,
}

/// Provenance carried by every Concept-to-Concept edge (§3.2): "Every
/// Concept-to-Concept edge carries `{confidence, category, source,
/// created_at, created_by?, job_id?, document_id?}`."
///
/// Structural edges (`HAS_SOURCE`, `IN_CATEGORY`, `SIMILAR_TO`, ...) reuse
/// the same shape with looser field requirements — `confidence` defaults to
/// `1.0` and `category` to the edge's relationship name when there is no
/// meaningful distinct value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeProvenance {
    pub confidence: f32,
    pub category: String,
    pub source: EdgeSource,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub job_id: Option<String>,
    pub document_id: Option<String>,
}

impl EdgeProvenance {
    pub fn new(category: impl Into<String>, source: EdgeSource) -> Self {
        Self {
            confidence: 1.0,
            category: category.into(),
            source,
            created_at: Utc::now(),
            created_by: None,
            job_id: None,
            document_id: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// Properties collection backing an edge, distinct from its provenance.
pub type EdgeProperties = HashMap<String, PropertyValue>;

/// A directed, typed, immutable edge in the property graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// `APPEARS_IN`, `EVIDENCED_BY`, `HAS_SOURCE`, `IN_CATEGORY`, `SIMILAR_TO`,
    /// or an active VocabType's UPPER_SNAKE name.
    pub relationship: String,
    pub provenance: EdgeProvenance,
    /// Relationship-specific extras (e.g. `SIMILAR_TO`'s `similarity`).
    pub properties: EdgeProperties,
}

impl Edge {
    pub fn new(
        source: NodeId,
        target: NodeId,
        relationship: impl Into<String>,
        provenance: EdgeProvenance,
    ) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            relationship: relationship.into(),
            provenance,
            properties: HashMap::new(),
        }
    }

    /// Structural edge with no interesting provenance beyond "when".
    pub fn structural(source: NodeId, target: NodeId, relationship: impl Into<String>) -> Self {
        let relationship = relationship.into();
        let provenance = EdgeProvenance::new(relationship.clone(), EdgeSource::HumanCuration);
        Self::new(source, target, relationship, provenance)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
