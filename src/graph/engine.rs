//! GraphEngine: the in-memory cache + persistence coordinator sitting under
//! the store client (L1) and query facade (L2).
//!
//! Mirrors the teacher's `PlexusEngine`: an in-memory `DashMap` of ontologies
//! backed by an optional `GraphStore`, with `data_version`-based cache
//! coherence (`reload_if_changed`) so multiple engine instances sharing one
//! SQLite file stay consistent without a shared-memory lock.

use super::edge::Edge;
use super::node::Node;
use super::node::NodeId;
use super::ontology::{Ontology, OntologyId};
use crate::storage::{GraphStore, StorageError};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphEngineError {
    #[error("ontology not found: {0}")]
    OntologyNotFound(OntologyId),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Other(String),
}

pub type GraphEngineResult<T> = Result<T, GraphEngineError>;

/// In-memory cache of ontologies, optionally backed by persistent storage.
///
/// Every L1 typed helper and the L2 facade ultimately call through here:
/// this is the single place the property graph is mutated in process memory
/// before (optionally) being flushed to `GraphStore`.
pub struct GraphEngine {
    ontologies: DashMap<OntologyId, Ontology>,
    /// Maps ontology name -> id, since most callers address ontologies by
    /// their logical name (`Source.document`) rather than the generated id.
    by_name: DashMap<String, OntologyId>,
    store: Option<Arc<dyn GraphStore>>,
    last_data_version: AtomicU64,
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("ontologies", &self.ontologies.len())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphEngine {
    pub fn new() -> Self {
        Self {
            ontologies: DashMap::new(),
            by_name: DashMap::new(),
            store: None,
            last_data_version: AtomicU64::new(0),
        }
    }

    pub fn with_store(store: Arc<dyn GraphStore>) -> Self {
        Self {
            ontologies: DashMap::new(),
            by_name: DashMap::new(),
            store: Some(store),
            last_data_version: AtomicU64::new(0),
        }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Load all ontologies from storage into memory. Call on startup.
    pub fn load_all(&self) -> GraphEngineResult<usize> {
        let Some(ref store) = self.store else {
            return Ok(0);
        };
        let ids = store.list_ontologies()?;
        let mut loaded = 0;
        for id in ids {
            if let Some(ontology) = store.load_ontology(&id)? {
                self.by_name.insert(ontology.name.clone(), id.clone());
                self.ontologies.insert(id, ontology);
                loaded += 1;
            }
        }
        if let Ok(v) = store.data_version() {
            self.last_data_version.store(v, std::sync::atomic::Ordering::Release);
        }
        Ok(loaded)
    }

    /// Get or create an ontology by logical name (the `ontology`/`document`
    /// partition key threaded through every ingestion and query operation).
    pub fn ontology_id_for_name(&self, name: &str) -> OntologyId {
        if let Some(id) = self.by_name.get(name) {
            return id.clone();
        }
        let ontology = Ontology::new(name);
        let id = ontology.id.clone();
        self.by_name.insert(name.to_string(), id.clone());
        self.ontologies.insert(id.clone(), ontology.clone());
        if let Some(ref store) = self.store {
            let _ = store.save_ontology(&ontology);
        }
        id
    }

    pub fn upsert_ontology(&self, ontology: Ontology) -> GraphEngineResult<OntologyId> {
        let id = ontology.id.clone();
        if let Some(ref store) = self.store {
            store.save_ontology(&ontology)?;
        }
        self.by_name.insert(ontology.name.clone(), id.clone());
        self.ontologies.insert(id.clone(), ontology);
        Ok(id)
    }

    pub fn get_ontology(&self, id: &OntologyId) -> Option<Ontology> {
        self.ontologies.get(id).map(|r| r.clone())
    }

    pub fn get_ontology_by_name(&self, name: &str) -> Option<Ontology> {
        let id = self.by_name.get(name)?.clone();
        self.get_ontology(&id)
    }

    /// Delete an ontology (cascade documented in §4.7, implemented by the
    /// ingestion module's cleanup path — this only removes the partition).
    pub fn remove_ontology(&self, id: &OntologyId) -> GraphEngineResult<Option<Ontology>> {
        if let Some(ref store) = self.store {
            store.delete_ontology(id)?;
        }
        let removed = self.ontologies.remove(id).map(|(_, o)| o);
        if let Some(ref o) = removed {
            self.by_name.remove(&o.name);
        }
        Ok(removed)
    }

    pub fn list_ontology_ids(&self) -> Vec<OntologyId> {
        self.ontologies.iter().map(|r| r.key().clone()).collect()
    }

    pub fn ontology_count(&self) -> usize {
        self.ontologies.len()
    }

    /// Execute a closure with mutable access to an ontology, persisting the
    /// result afterward. This is the commit point for the ingestion sink
    /// (L7) and every vocabulary/grounding mutation.
    pub fn with_ontology_mut<R>(
        &self,
        id: &OntologyId,
        f: impl FnOnce(&mut Ontology) -> R,
    ) -> GraphEngineResult<R> {
        let mut ontology = self
            .ontologies
            .get_mut(id)
            .ok_or_else(|| GraphEngineError::OntologyNotFound(id.clone()))?;
        let result = f(&mut ontology);
        if let Some(ref store) = self.store {
            store.save_ontology(&ontology)?;
        }
        Ok(result)
    }

    /// Check `data_version` and reload all ontologies if another engine
    /// sharing the same backing store has written since our last read.
    pub fn reload_if_changed(&self) -> GraphEngineResult<bool> {
        let Some(ref store) = self.store else {
            return Ok(false);
        };
        let current = store.data_version()?;
        let last = self.last_data_version.load(std::sync::atomic::Ordering::Acquire);
        if current == last {
            return Ok(false);
        }
        let ids = store.list_ontologies()?;
        for id in &ids {
            if let Some(ontology) = store.load_ontology(id)? {
                self.by_name.insert(ontology.name.clone(), id.clone());
                self.ontologies.insert(id.clone(), ontology);
            }
        }
        let stored: HashSet<OntologyId> = ids.into_iter().collect();
        self.ontologies.retain(|id, _| stored.contains(id));
        self.last_data_version.store(current, std::sync::atomic::Ordering::Release);
        Ok(true)
    }

    pub fn add_node(&self, id: &OntologyId, node: Node) -> GraphEngineResult<NodeId> {
        self.with_ontology_mut(id, |o| o.add_node(node))
    }

    pub fn add_edge(&self, id: &OntologyId, edge: Edge) -> GraphEngineResult<()> {
        self.with_ontology_mut(id, |o| o.add_edge(edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::Concept;
    use crate::storage::{OpenStore, SqliteStore};

    #[test]
    fn new_engine_has_no_ontologies() {
        let engine = GraphEngine::new();
        assert_eq!(engine.ontology_count(), 0);
        assert!(!engine.has_store());
    }

    #[test]
    fn ontology_id_for_name_is_idempotent() {
        let engine = GraphEngine::new();
        let a = engine.ontology_id_for_name("acme-corp");
        let b = engine.ontology_id_for_name("acme-corp");
        assert_eq!(a, b);
        assert_eq!(engine.ontology_count(), 1);
    }

    #[test]
    fn upsert_persists_to_store() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = GraphEngine::with_store(store.clone());

        let ontology = Ontology::new("persisted");
        let id = ontology.id.clone();
        engine.upsert_ontology(ontology).unwrap();

        let from_store = store.load_ontology(&id).unwrap();
        assert!(from_store.is_some());
        assert_eq!(from_store.unwrap().name, "persisted");
    }

    #[test]
    fn with_ontology_mut_commits_node_additions() {
        let engine = GraphEngine::new();
        let id = engine.ontology_id_for_name("test");
        let concept = Concept::new("travel", "going places", vec![0.1, 0.2]).into_node();

        engine.add_node(&id, concept).unwrap();
        let ontology = engine.get_ontology(&id).unwrap();
        assert_eq!(ontology.node_count(), 1);
    }

    #[test]
    fn reload_if_changed_detects_external_write() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("coherence.db");

        let store_a: Arc<dyn GraphStore> = Arc::new(SqliteStore::open(&db_path).unwrap());
        let store_b: Arc<dyn GraphStore> = Arc::new(SqliteStore::open(&db_path).unwrap());

        let engine_a = GraphEngine::with_store(store_a);
        let engine_b = GraphEngine::with_store(store_b);

        let id = engine_a.ontology_id_for_name("shared");
        engine_a.load_all().unwrap();

        engine_b.load_all().unwrap();
        assert_eq!(engine_b.get_ontology(&id).unwrap().node_count(), 0);

        engine_a
            .with_ontology_mut(&id, |o| {
                o.add_node(Concept::new("a", "a", vec![0.1]).into_node());
                o.add_node(Concept::new("b", "b", vec![0.2]).into_node());
            })
            .unwrap();

        let reloaded = engine_b.reload_if_changed().unwrap();
        assert!(reloaded);
        assert_eq!(engine_b.get_ontology(&id).unwrap().node_count(), 2);
    }

    #[test]
    fn remove_ontology_clears_name_index() {
        let engine = GraphEngine::new();
        let id = engine.ontology_id_for_name("gone");
        engine.remove_ontology(&id).unwrap();
        assert!(engine.get_ontology_by_name("gone").is_none());
    }
}
