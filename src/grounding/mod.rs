//! Grounding Engine (L8, SPEC_FULL §4.8): polarity-axis triangulation for a
//! per-Concept "grounding strength" score.
//!
//! No teacher analogue; built fresh atop the vocabulary store's VocabType
//! embeddings (`vocabulary::store::VocabularyStore`) and the concept
//! graph's incoming edges, following the same `thiserror`/`Arc<GraphEngine>`
//! shape the vocabulary manager (L5) and epistemic status service (L9) use.

use crate::graph::{GraphEngine, GraphEngineError, NodeId, NodeLabel, OntologyId};
use crate::vocabulary::{StoreError, VocabularyStore};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroundingError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphEngineError),
    #[error("vocabulary store error: {0}")]
    Store(#[from] StoreError),
    #[error("ontology not found: {0}")]
    OntologyNotFound(String),
}

pub type GroundingResult<T> = Result<T, GroundingError>;

/// Fixed opposing VocabType pairs that triangulate the polarity axis (§4.8).
pub const OPPOSING_PAIRS: &[(&str, &str)] = &[
    ("SUPPORTS", "CONTRADICTS"),
    ("VALIDATES", "REFUTES"),
    ("CONFIRMS", "DISPROVES"),
    ("REINFORCES", "OPPOSES"),
    ("ENABLES", "PREVENTS"),
];

/// Telemetry-only bucket for a grounding strength value (§4.8); never drives
/// behavior, only reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundingBucket {
    StrongPositive,
    Moderate,
    Weak,
    Negative,
}

pub fn bucket_for(strength: f32) -> GroundingBucket {
    if strength > 0.7 {
        GroundingBucket::StrongPositive
    } else if strength >= 0.3 {
        GroundingBucket::Moderate
    } else if strength >= 0.0 {
        GroundingBucket::Weak
    } else {
        GroundingBucket::Negative
    }
}

/// Optional include/exclude filter over which incoming edge types count
/// toward a concept's grounding strength (§4.8).
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
}

impl TypeFilter {
    fn allows(&self, relationship: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.iter().any(|t| t == relationship) {
                return false;
            }
        }
        !self.exclude.iter().any(|t| t == relationship)
    }
}

pub struct GroundingEngine {
    engine: Arc<GraphEngine>,
    vocabulary: Arc<VocabularyStore>,
}

impl GroundingEngine {
    pub fn new(engine: Arc<GraphEngine>, vocabulary: Arc<VocabularyStore>) -> Self {
        Self { engine, vocabulary }
    }

    /// Average the surviving opposing pairs' diff vectors into a single
    /// unit polarity axis (§4.8). Empty when no pair has both embeddings.
    pub fn compute_axis(&self) -> GroundingResult<Vec<f32>> {
        let mut sum: Option<Vec<f32>> = None;
        let mut count = 0usize;

        for (pos, neg) in OPPOSING_PAIRS {
            let Some(pos_row) = self.vocabulary.get(pos)? else { continue };
            let Some(neg_row) = self.vocabulary.get(neg)? else { continue };
            let (Some(pos_emb), Some(neg_emb)) = (pos_row.embedding, neg_row.embedding) else { continue };
            if pos_emb.len() != neg_emb.len() || pos_emb.is_empty() {
                continue;
            }
            let diff: Vec<f32> = pos_emb.iter().zip(neg_emb.iter()).map(|(p, n)| p - n).collect();
            match &mut sum {
                Some(acc) if acc.len() == diff.len() => {
                    for (a, d) in acc.iter_mut().zip(diff.iter()) {
                        *a += d;
                    }
                }
                None => sum = Some(diff),
                _ => continue,
            }
            count += 1;
        }

        let Some(mut axis) = sum else { return Ok(Vec::new()) };
        if count == 0 {
            return Ok(Vec::new());
        }
        for v in axis.iter_mut() {
            *v /= count as f32;
        }
        let norm: f32 = axis.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in axis.iter_mut() {
                *v /= norm;
            }
        }
        Ok(axis)
    }

    /// Grounding strength for one concept (§4.8): confidence-weighted mean
    /// projection of its incoming edges' VocabType embeddings onto the axis.
    pub fn grounding_strength(
        &self,
        ontology_id: &OntologyId,
        concept_id: &NodeId,
        filter: &TypeFilter,
    ) -> GroundingResult<f32> {
        let axis = self.compute_axis()?;
        if axis.is_empty() {
            return Ok(0.0);
        }
        let ontology = self
            .engine
            .get_ontology(ontology_id)
            .ok_or_else(|| GroundingError::OntologyNotFound(ontology_id.to_string()))?;

        let mut num = 0.0f32;
        let mut den = 0.0f32;
        for edge in ontology.edges_to(concept_id) {
            if !filter.allows(&edge.relationship) {
                continue;
            }
            let Some(row) = self.vocabulary.get(&edge.relationship)? else { continue };
            let Some(embedding) = row.embedding else { continue };
            if embedding.len() != axis.len() {
                continue;
            }
            let projection: f32 = embedding.iter().zip(axis.iter()).map(|(e, a)| e * a).sum();
            let weight = edge.provenance.confidence;
            num += projection * weight;
            den += weight;
        }

        Ok(if den > 0.0 { num / den } else { 0.0 })
    }

    /// Batch job (§4.8): recompute and persist `grounding_strength` for
    /// every Concept in `ontology_id`.
    pub fn recompute_ontology(&self, ontology_id: &OntologyId, filter: &TypeFilter) -> GroundingResult<usize> {
        let concept_ids: Vec<NodeId> = {
            let ontology = self
                .engine
                .get_ontology(ontology_id)
                .ok_or_else(|| GroundingError::OntologyNotFound(ontology_id.to_string()))?;
            ontology.nodes().filter(|n| n.label == NodeLabel::Concept).map(|n| n.id.clone()).collect()
        };

        let mut updated = 0;
        for concept_id in concept_ids {
            let strength = self.grounding_strength(ontology_id, &concept_id, filter)?;
            self.engine.with_ontology_mut(ontology_id, |o| {
                if let Some(node) = o.get_node_mut(&concept_id) {
                    node.properties.insert("grounding_strength".to_string(), strength.into());
                }
            })?;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Concept, Edge, EdgeProvenance, EdgeSource};
    use crate::vocabulary::VocabularyRow;

    fn row(name: &str, embedding: Vec<f32>) -> VocabularyRow {
        VocabularyRow {
            name: name.to_string(),
            category: "causation".into(),
            category_source: "builtin".into(),
            category_confidence: None,
            category_scores: None,
            category_ambiguous: false,
            description: None,
            embedding: Some(embedding),
            embedding_model: Some("test".into()),
            synonyms: Vec::new(),
            added_by: "system".into(),
            added_at: chrono::Utc::now(),
            is_active: true,
            deprecation_reason: None,
        }
    }

    fn edge_with_confidence(source: NodeId, target: NodeId, relationship: &str, confidence: f32) -> Edge {
        Edge::new(
            source,
            target,
            relationship,
            EdgeProvenance::new(relationship, EdgeSource::LlmExtraction).with_confidence(confidence),
        )
    }

    #[test]
    fn compute_axis_is_empty_without_any_pair_embeddings() {
        let engine = Arc::new(GraphEngine::new());
        let store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        let grounding = GroundingEngine::new(engine, store);
        assert!(grounding.compute_axis().unwrap().is_empty());
    }

    #[test]
    fn compute_axis_averages_surviving_pairs() {
        let engine = Arc::new(GraphEngine::new());
        let store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        store.insert_if_absent(&row("SUPPORTS", vec![1.0, 0.0])).unwrap();
        store.insert_if_absent(&row("CONTRADICTS", vec![-1.0, 0.0])).unwrap();
        store.insert_if_absent(&row("VALIDATES", vec![0.0, 1.0])).unwrap();
        // REFUTES deliberately absent: its pair shouldn't contribute.

        let grounding = GroundingEngine::new(engine, store);
        let axis = grounding.compute_axis().unwrap();
        assert_eq!(axis.len(), 2);
        let norm: f32 = axis.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn grounding_strength_is_zero_without_an_axis() {
        let engine = Arc::new(GraphEngine::new());
        let store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        let grounding = GroundingEngine::new(engine.clone(), store);

        let ontology_id = engine.ontology_id_for_name("doc-a");
        let concept = engine.add_node(&ontology_id, Concept::new("x", "x", vec![0.1]).into_node()).unwrap();

        let strength = grounding.grounding_strength(&ontology_id, &concept, &TypeFilter::default()).unwrap();
        assert_eq!(strength, 0.0);
    }

    #[test]
    fn grounding_strength_weights_incoming_edges_by_confidence() {
        let engine = Arc::new(GraphEngine::new());
        let store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        store.insert_if_absent(&row("SUPPORTS", vec![1.0, 0.0])).unwrap();
        store.insert_if_absent(&row("CONTRADICTS", vec![-1.0, 0.0])).unwrap();

        let grounding = GroundingEngine::new(engine.clone(), store);
        let ontology_id = engine.ontology_id_for_name("doc-a");
        let concept = engine.add_node(&ontology_id, Concept::new("x", "x", vec![0.1]).into_node()).unwrap();
        let other = engine.add_node(&ontology_id, Concept::new("y", "y", vec![0.2]).into_node()).unwrap();

        engine.add_edge(&ontology_id, edge_with_confidence(other, concept.clone(), "SUPPORTS", 1.0)).unwrap();

        let strength = grounding.grounding_strength(&ontology_id, &concept, &TypeFilter::default()).unwrap();
        assert!(strength > 0.9, "SUPPORTS should project strongly positive, got {strength}");
    }

    #[test]
    fn type_filter_exclude_drops_matching_edges() {
        let engine = Arc::new(GraphEngine::new());
        let store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        store.insert_if_absent(&row("SUPPORTS", vec![1.0, 0.0])).unwrap();
        store.insert_if_absent(&row("CONTRADICTS", vec![-1.0, 0.0])).unwrap();

        let grounding = GroundingEngine::new(engine.clone(), store);
        let ontology_id = engine.ontology_id_for_name("doc-a");
        let concept = engine.add_node(&ontology_id, Concept::new("x", "x", vec![0.1]).into_node()).unwrap();
        let other = engine.add_node(&ontology_id, Concept::new("y", "y", vec![0.2]).into_node()).unwrap();
        engine.add_edge(&ontology_id, edge_with_confidence(other, concept.clone(), "SUPPORTS", 1.0)).unwrap();

        let filter = TypeFilter { include: None, exclude: vec!["SUPPORTS".to_string()] };
        let strength = grounding.grounding_strength(&ontology_id, &concept, &filter).unwrap();
        assert_eq!(strength, 0.0);
    }

    #[test]
    fn recompute_ontology_persists_grounding_strength_onto_nodes() {
        let engine = Arc::new(GraphEngine::new());
        let store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        store.insert_if_absent(&row("SUPPORTS", vec![1.0, 0.0])).unwrap();
        store.insert_if_absent(&row("CONTRADICTS", vec![-1.0, 0.0])).unwrap();

        let grounding = GroundingEngine::new(engine.clone(), store);
        let ontology_id = engine.ontology_id_for_name("doc-a");
        let concept = engine.add_node(&ontology_id, Concept::new("x", "x", vec![0.1]).into_node()).unwrap();
        let other = engine.add_node(&ontology_id, Concept::new("y", "y", vec![0.2]).into_node()).unwrap();
        engine.add_edge(&ontology_id, edge_with_confidence(other, concept.clone(), "SUPPORTS", 1.0)).unwrap();

        let updated = grounding.recompute_ontology(&ontology_id, &TypeFilter::default()).unwrap();
        assert_eq!(updated, 2);

        let ontology = engine.get_ontology(&ontology_id).unwrap();
        let node = ontology.get_node(&concept).unwrap();
        let persisted = node.get("grounding_strength").and_then(|v| v.as_f64()).unwrap();
        assert!(persisted > 0.9);
    }

    #[test]
    fn bucket_boundaries_match_spec_thresholds() {
        assert_eq!(bucket_for(0.95), GroundingBucket::StrongPositive);
        assert_eq!(bucket_for(0.5), GroundingBucket::Moderate);
        assert_eq!(bucket_for(0.1), GroundingBucket::Weak);
        assert_eq!(bucket_for(-0.2), GroundingBucket::Negative);
    }
}
