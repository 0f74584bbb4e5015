//! Epistemic Status Service (L9, SPEC_FULL §4.9): classifies each VocabType
//! into a confidence bucket by sampling the grounding strength of concepts
//! it asserts things about.
//!
//! No teacher analogue; built on top of the grounding engine (L8) and the
//! metrics counters (L12), following the same `Arc<GraphEngine>`/thiserror
//! shape as the vocabulary manager (L5).

use crate::graph::{EpistemicStatus, GraphEngine, GraphEngineError, NodeLabel, OntologyId, VocabType, VOCABULARY_ONTOLOGY};
use crate::grounding::{GroundingEngine, GroundingError, TypeFilter};
use crate::metrics::{GraphMetrics, MetricsError, EPISTEMIC_MEASUREMENT_COUNTER, VOCABULARY_CHANGE_COUNTER};
use rand::seq::SliceRandom;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpistemicError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphEngineError),
    #[error("grounding error: {0}")]
    Grounding(#[from] GroundingError),
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

pub type EpistemicResult<T> = Result<T, EpistemicError>;

const DEFAULT_SAMPLE_SIZE: usize = 100;
const MIN_SUCCESSFUL_SAMPLES: usize = 3;

/// Name fragments that force `HISTORICAL` regardless of measured grounding
/// (§4.9): a relationship like `WAS_CAPITAL_OF` is asserting something about
/// the past, which the grounding axis (built for present-tense polarity)
/// cannot meaningfully score.
const HISTORICAL_MARKERS: &[&str] =
    &["WAS", "WERE", "HAD", "HISTORICAL", "FORMER", "PREVIOUS", "PAST", "ANCIENT", "ORIGINALLY"];

fn is_historical_by_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    HISTORICAL_MARKERS.iter().any(|marker| upper.split(['_', ' ']).any(|word| word == *marker))
}

fn classify_mean(mean: f32) -> EpistemicStatus {
    if mean > 0.8 {
        EpistemicStatus::Affirmative
    } else if mean >= 0.15 {
        EpistemicStatus::Contested
    } else if mean > 0.0 {
        EpistemicStatus::Emerging
    } else if mean < -0.5 {
        EpistemicStatus::Contradictory
    } else {
        EpistemicStatus::Unclassified
    }
}

pub struct EpistemicStatusService {
    engine: Arc<GraphEngine>,
    grounding: Arc<GroundingEngine>,
    metrics: Arc<GraphMetrics>,
    sample_size: usize,
}

impl EpistemicStatusService {
    pub fn new(engine: Arc<GraphEngine>, grounding: Arc<GroundingEngine>, metrics: Arc<GraphMetrics>) -> Self {
        Self { engine, grounding, metrics, sample_size: DEFAULT_SAMPLE_SIZE }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Every `(ontology_id, concept_id)` target of an edge named
    /// `vocab_type_name`, across every concept ontology (§4.9).
    fn incoming_targets(&self, vocab_type_name: &str) -> Vec<(OntologyId, crate::graph::NodeId)> {
        let vocab_ontology = self.engine.ontology_id_for_name(VOCABULARY_ONTOLOGY);
        let mut targets = Vec::new();
        for ontology_id in self.engine.list_ontology_ids() {
            if ontology_id == vocab_ontology {
                continue;
            }
            let Some(ontology) = self.engine.get_ontology(&ontology_id) else { continue };
            for edge in ontology.edges() {
                if edge.relationship == vocab_type_name {
                    targets.push((ontology_id.clone(), edge.target.clone()));
                }
            }
        }
        targets
    }

    /// Measure and persist one VocabType's epistemic status (§4.9).
    pub fn measure(&self, vocab_type_name: &str) -> EpistemicResult<EpistemicStatus> {
        let status = self.classify(vocab_type_name)?;
        self.write_back(vocab_type_name, status.0, &status.1)?;
        self.metrics.increment(EPISTEMIC_MEASUREMENT_COUNTER)?;
        self.metrics.mark_measurement_complete(VOCABULARY_CHANGE_COUNTER)?;
        Ok(status.0)
    }

    /// Measure every active VocabType in the vocabulary graph (§4.11's
    /// `epistemic_remeasurement` launcher's target operation).
    pub fn measure_all(&self) -> EpistemicResult<usize> {
        let vocab_ontology = self.engine.ontology_id_for_name(VOCABULARY_ONTOLOGY);
        let names: Vec<String> = self
            .engine
            .get_ontology(&vocab_ontology)
            .map(|o| {
                o.nodes()
                    .filter(|n| n.label == NodeLabel::VocabType)
                    .filter_map(|n| VocabType::from_node(n))
                    .filter(|v| v.is_active)
                    .map(|v| v.name)
                    .collect()
            })
            .unwrap_or_default();

        let mut measured = 0;
        for name in names {
            self.measure(&name)?;
            measured += 1;
        }
        Ok(measured)
    }

    fn classify(&self, vocab_type_name: &str) -> EpistemicResult<(EpistemicStatus, String)> {
        if is_historical_by_name(vocab_type_name) {
            return Ok((EpistemicStatus::Historical, "name matches a historical-tense marker".to_string()));
        }

        let mut targets = self.incoming_targets(vocab_type_name);
        if targets.is_empty() {
            return Ok((EpistemicStatus::InsufficientData, "no incoming edges of this type".to_string()));
        }

        targets.shuffle(&mut rand::thread_rng());
        targets.truncate(self.sample_size);

        let mut successes = Vec::new();
        for (ontology_id, concept_id) in &targets {
            if let Ok(strength) = self.grounding.grounding_strength(ontology_id, concept_id, &TypeFilter::default()) {
                successes.push(strength);
            }
        }

        if successes.len() < MIN_SUCCESSFUL_SAMPLES {
            return Ok((
                EpistemicStatus::InsufficientData,
                format!("only {} of {} sampled concepts yielded a grounding score", successes.len(), targets.len()),
            ));
        }

        let mean: f32 = successes.iter().sum::<f32>() / successes.len() as f32;
        let status = classify_mean(mean);
        let rationale = format!("mean grounding {mean:.3} over {} successful samples", successes.len());
        Ok((status, rationale))
    }

    fn write_back(&self, vocab_type_name: &str, status: EpistemicStatus, rationale: &str) -> EpistemicResult<()> {
        let vocab_ontology = self.engine.ontology_id_for_name(VOCABULARY_ONTOLOGY);
        let node_id = VocabType::new(vocab_type_name).node_id();
        let measured_at = chrono::Utc::now().to_rfc3339();
        self.engine.with_ontology_mut(&vocab_ontology, |ontology| {
            if let Some(node) = ontology.get_node_mut(&node_id) {
                node.properties.insert("epistemic_status".to_string(), status.as_str().into());
                node.properties.insert("epistemic_rationale".to_string(), rationale.into());
                node.properties.insert("epistemic_measured_at".to_string(), measured_at.into());
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Concept, Edge, EdgeProvenance, EdgeSource};
    use crate::vocabulary::{VocabularyRow, VocabularyStore};

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

    fn make_service() -> (Arc<GraphEngine>, EpistemicStatusService) {
        let engine = Arc::new(GraphEngine::new());
        let vocab_store = Arc::new(VocabularyStore::open_in_memory().unwrap());
        vocab_store.insert_if_absent(&row("SUPPORTS", vec![1.0, 0.0])).unwrap();
        vocab_store.insert_if_absent(&row("CONTRADICTS", vec![-1.0, 0.0])).unwrap();
        let grounding = Arc::new(GroundingEngine::new(engine.clone(), vocab_store));
        let metrics = Arc::new(GraphMetrics::open_in_memory().unwrap());
        let service = EpistemicStatusService::new(engine.clone(), grounding, metrics);
        (engine, service)
    }

    #[test]
    fn historical_marker_in_name_always_wins() {
        let (_, service) = make_service();
        let (status, _) = service.classify("WAS_CAPITAL_OF").unwrap();
        assert_eq!(status, EpistemicStatus::Historical);
    }

    #[test]
    fn no_incoming_edges_is_insufficient_data() {
        let (_, service) = make_service();
        let (status, _) = service.classify("SUPPORTS").unwrap();
        assert_eq!(status, EpistemicStatus::InsufficientData);
    }

    #[test]
    fn fewer_than_three_samples_is_insufficient_data() {
        let (engine, service) = make_service();
        let ontology_id = engine.ontology_id_for_name("doc-a");
        let a = engine.add_node(&ontology_id, Concept::new("a", "a", vec![0.1]).into_node()).unwrap();
        let b = engine.add_node(&ontology_id, Concept::new("b", "b", vec![0.2]).into_node()).unwrap();
        engine
            .add_edge(
                &ontology_id,
                Edge::new(a, b, "SUPPORTS", EdgeProvenance::new("SUPPORTS", EdgeSource::LlmExtraction)),
            )
            .unwrap();

        let (status, _) = service.classify("SUPPORTS").unwrap();
        assert_eq!(status, EpistemicStatus::InsufficientData);
    }

    #[test]
    fn strongly_supported_concepts_classify_affirmative() {
        let (engine, service) = make_service();
        let ontology_id = engine.ontology_id_for_name("doc-a");
        let hub = engine.add_node(&ontology_id, Concept::new("hub", "hub", vec![0.3]).into_node()).unwrap();
        for i in 0..4 {
            let target = engine
                .add_node(&ontology_id, Concept::new(format!("c{i}"), "c", vec![0.1]).into_node())
                .unwrap();
            engine
                .add_edge(
                    &ontology_id,
                    Edge::new(
                        hub.clone(),
                        target,
                        "SUPPORTS",
                        EdgeProvenance::new("SUPPORTS", EdgeSource::LlmExtraction),
                    ),
                )
                .unwrap();
        }

        let (status, rationale) = service.classify("SUPPORTS").unwrap();
        assert_eq!(status, EpistemicStatus::Affirmative);
        assert!(rationale.contains("mean grounding"));
    }

    #[test]
    fn measure_writes_back_status_onto_vocab_type_node() {
        let (engine, service) = make_service();
        let ontology_id = engine.ontology_id_for_name("doc-a");
        let hub = engine.add_node(&ontology_id, Concept::new("hub", "hub", vec![0.3]).into_node()).unwrap();
        for i in 0..4 {
            let target = engine
                .add_node(&ontology_id, Concept::new(format!("c{i}"), "c", vec![0.1]).into_node())
                .unwrap();
            engine
                .add_edge(
                    &ontology_id,
                    Edge::new(
                        hub.clone(),
                        target,
                        "SUPPORTS",
                        EdgeProvenance::new("SUPPORTS", EdgeSource::LlmExtraction),
                    ),
                )
                .unwrap();
        }

        let vocab_ontology = engine.ontology_id_for_name(VOCABULARY_ONTOLOGY);
        engine.add_node(&vocab_ontology, VocabType::builtin("SUPPORTS").into_node()).unwrap();

        let status = service.measure("SUPPORTS").unwrap();
        assert_eq!(status, EpistemicStatus::Affirmative);

        let ontology = engine.get_ontology(&vocab_ontology).unwrap();
        let node = ontology.get_node(&VocabType::new("SUPPORTS").node_id()).unwrap();
        assert_eq!(node.get_str("epistemic_status"), Some("AFFIRMATIVE"));
        assert!(node.get_str("epistemic_rationale").is_some());
    }
}
