//! In-memory vector store and cosine-similarity scan, grounded in
//! examples/nrgforge-plexus/src/adapter/embedding.rs's `VectorStore` trait
//! and `InMemoryVectorStore`. The persistent counterpart
//! (`crate::storage::SqliteVecStore`, behind the `embeddings` feature)
//! implements this same trait via sqlite-vec's KNN index.

use crate::graph::NodeId;
use dashmap::DashMap;

/// Ontology-partitioned nearest-neighbor search over embedding vectors.
/// Used by L6/L7's upsert-by-meaning dedup and L5's synonym detection.
pub trait VectorStore: Send + Sync {
    fn store(&self, ontology_id: &str, node_id: &NodeId, vector: Vec<f32>);

    fn has(&self, ontology_id: &str, node_id: &NodeId) -> bool;

    /// Nodes in `ontology_id` whose stored vector has cosine similarity
    /// `>= threshold` with `query`, most similar first.
    fn find_similar(&self, ontology_id: &str, query: &[f32], threshold: f32) -> Vec<(NodeId, f32)>;
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: DashMap<(String, NodeId), Vec<f32>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn store(&self, ontology_id: &str, node_id: &NodeId, vector: Vec<f32>) {
        self.vectors.insert((ontology_id.to_string(), node_id.clone()), vector);
    }

    fn has(&self, ontology_id: &str, node_id: &NodeId) -> bool {
        self.vectors.contains_key(&(ontology_id.to_string(), node_id.clone()))
    }

    fn find_similar(&self, ontology_id: &str, query: &[f32], threshold: f32) -> Vec<(NodeId, f32)> {
        let mut matches: Vec<(NodeId, f32)> = self
            .vectors
            .iter()
            .filter(|entry| entry.key().0 == ontology_id)
            .filter_map(|entry| {
                let sim = super::embedder::cosine_similarity(query, entry.value());
                if sim >= threshold {
                    Some((entry.key().1.clone(), sim))
                } else {
                    None
                }
            })
            .collect();
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_similar_respects_ontology_partition() {
        let store = InMemoryVectorStore::new();
        let a = NodeId::from_string("concept:a");
        let b = NodeId::from_string("concept:b");
        store.store("onto-1", &a, vec![1.0, 0.0]);
        store.store("onto-2", &b, vec![1.0, 0.0]);

        let results = store.find_similar("onto-1", &[1.0, 0.0], 0.9);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, a);
    }

    #[test]
    fn find_similar_sorts_descending_by_similarity() {
        let store = InMemoryVectorStore::new();
        let close = NodeId::from_string("concept:close");
        let closer = NodeId::from_string("concept:closer");
        store.store("onto", &close, vec![0.9, 0.1]);
        store.store("onto", &closer, vec![0.99, 0.01]);

        let results = store.find_similar("onto", &[1.0, 0.0], 0.5);
        assert_eq!(results[0].0, closer);
    }

    #[test]
    fn has_reflects_stored_state() {
        let store = InMemoryVectorStore::new();
        let node = NodeId::from_string("concept:travel");
        assert!(!store.has("onto", &node));
        store.store("onto", &node, vec![0.1, 0.2]);
        assert!(store.has("onto", &node));
    }
}
