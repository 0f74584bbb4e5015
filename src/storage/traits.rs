//! Storage trait definitions.

use crate::graph::{Edge, Node, NodeId, NodeLabel, Ontology, OntologyId};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ontology not found: {0}")]
    OntologyNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Filter criteria for querying nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// Filter by node label (§3.1).
    pub label: Option<NodeLabel>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: NodeLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter criteria for querying edges.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    /// Filter by relationship type.
    pub relationship: Option<String>,
    /// Filter by minimum provenance confidence (§3.2).
    pub min_confidence: Option<f32>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl EdgeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A subgraph extracted from the full graph.
#[derive(Debug, Clone)]
pub struct Subgraph {
    /// Nodes in the subgraph.
    pub nodes: Vec<Node>,
    /// Edges in the subgraph (only those where both endpoints are in nodes).
    pub edges: Vec<Edge>,
}

/// Trait for graph storage backends.
///
/// Implementations must be thread-safe (Send + Sync) to support
/// concurrent access from multiple threads.
pub trait GraphStore: Send + Sync {
    // === Ontology operations ===

    /// Create or update an ontology.
    fn save_ontology(&self, ontology: &Ontology) -> StorageResult<()>;

    /// Load an ontology by id.
    fn load_ontology(&self, id: &OntologyId) -> StorageResult<Option<Ontology>>;

    /// Delete an ontology and all its nodes/edges.
    fn delete_ontology(&self, id: &OntologyId) -> StorageResult<bool>;

    /// List all ontology ids.
    fn list_ontologies(&self) -> StorageResult<Vec<OntologyId>>;

    // === Node operations ===

    /// Save a node (insert or update).
    fn save_node(&self, ontology_id: &OntologyId, node: &Node) -> StorageResult<()>;

    /// Load a node by id.
    fn load_node(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<Option<Node>>;

    /// Delete a node and its incident edges.
    fn delete_node(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<bool>;

    /// Find nodes matching filter criteria.
    fn find_nodes(&self, ontology_id: &OntologyId, filter: &NodeFilter) -> StorageResult<Vec<Node>>;

    // === Edge operations ===

    /// Save an edge. Edges are append-only (§3.2): callers never update one
    /// in place, only insert a fresh edge and delete the old one.
    fn save_edge(&self, ontology_id: &OntologyId, edge: &Edge) -> StorageResult<()>;

    /// Get edges originating from a node.
    fn get_edges_from(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<Vec<Edge>>;

    /// Get edges targeting a node.
    fn get_edges_to(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<Vec<Edge>>;

    /// Delete an edge.
    fn delete_edge(&self, ontology_id: &OntologyId, edge_id: &str) -> StorageResult<bool>;

    // === Subgraph operations ===

    /// Load a subgraph starting from seed nodes, traversing up to max_depth hops.
    fn load_subgraph(&self, ontology_id: &OntologyId, seeds: &[NodeId], max_depth: usize) -> StorageResult<Subgraph>;

    /// Monotonic counter that changes whenever any connection commits a
    /// write to this database (SQLite's `PRAGMA data_version`). Used by
    /// `GraphEngine::reload_if_changed` to detect writes made by another
    /// process or engine instance sharing the same backing store.
    fn data_version(&self) -> StorageResult<u64>;
}

/// Extension trait for opening stores from paths.
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path.
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing).
    fn open_in_memory() -> StorageResult<Self>;
}
