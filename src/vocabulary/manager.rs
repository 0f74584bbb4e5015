//! The vocabulary manager itself (§4.5): ties the relational
//! `relationship_vocabulary` store to the graph-wide VocabType/VocabCategory
//! nodes held in [`crate::graph::VOCABULARY_ONTOLOGY`].

use super::categorizer::{self, CategoryAssignment};
use super::store::{StoreError, VocabularyHistoryInsert, VocabularyPatch, VocabularyRow, VocabularyStore};
use crate::ai::{AiError, Embedder, VectorStore};
use crate::graph::{
    DirectionSemantics, Edge, GraphEngine, GraphEngineError, OntologyId, VocabCategory, VocabType,
    IN_CATEGORY, SIMILAR_TO, SYSTEM_TYPE_BLACKLIST, VOCABULARY_ONTOLOGY,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphEngineError),
    #[error("ai provider error: {0}")]
    Ai(AiError),
    #[error("ontology not found: {0}")]
    OntologyNotFound(String),
}

pub type VocabularyResult<T> = Result<T, VocabularyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    AlreadyExists,
}

/// Scope for `regenerate_embeddings` (§4.5 step 5).
pub enum RegenerateScope {
    All,
    MissingOnly,
    IncompatibleWith { model: String, dimensions: usize },
}

/// `llm_generated` is the sentinel category that triggers the probabilistic
/// categorizer (§4.5 step 1, §4.5.1) instead of taking the caller's category
/// at face value.
const LLM_GENERATED: &str = "llm_generated";

pub struct VocabularyManager {
    store: VocabularyStore,
    engine: Arc<GraphEngine>,
    embedder: Option<Arc<dyn Embedder>>,
    synonym_cache: Option<Arc<dyn VectorStore>>,
    embedding_model: String,
    synonym_threshold: f32,
}

impl VocabularyManager {
    pub fn new(store: VocabularyStore, engine: Arc<GraphEngine>) -> Self {
        Self {
            store,
            engine,
            embedder: None,
            synonym_cache: None,
            embedding_model: "nomic-embed-text-v1.5".to_string(),
            synonym_threshold: 0.85,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_synonym_cache(mut self, cache: Arc<dyn VectorStore>) -> Self {
        self.synonym_cache = Some(cache);
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_synonym_threshold(mut self, threshold: f32) -> Self {
        self.synonym_threshold = threshold;
        self
    }

    fn vocabulary_ontology_id(&self) -> OntologyId {
        self.engine.ontology_id_for_name(VOCABULARY_ONTOLOGY)
    }

    /// Add a new VocabType (§4.5 step 1). Idempotent: a pre-existing row
    /// returns `AlreadyExists` without touching the graph.
    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &self,
        name: &str,
        category: &str,
        description: Option<String>,
        added_by: &str,
        is_builtin: bool,
        direction_semantics: Option<DirectionSemantics>,
    ) -> VocabularyResult<AddOutcome> {
        if self.store.get(name)?.is_some() {
            return Ok(AddOutcome::AlreadyExists);
        }

        let embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(name).await.map_err(VocabularyError::Ai)?),
            None => None,
        };

        let (final_category, category_source, confidence, scores, ambiguous) =
            self.resolve_category(category, embedding.as_deref())?;

        let row = VocabularyRow {
            name: name.to_string(),
            category: final_category.clone(),
            category_source,
            category_confidence: confidence,
            category_scores: scores,
            category_ambiguous: ambiguous,
            description,
            embedding: embedding.clone(),
            embedding_model: embedding.as_ref().map(|_| self.embedding_model.clone()),
            synonyms: Vec::new(),
            added_by: added_by.to_string(),
            added_at: chrono::Utc::now(),
            is_active: true,
            deprecation_reason: None,
        };
        self.store.insert_if_absent(&row)?;

        let mut vocab_type = if is_builtin { VocabType::builtin(name) } else { VocabType::new(name) };
        vocab_type.direction_semantics = direction_semantics;
        let vocab_type_id = vocab_type.node_id();
        let vocab_ontology = self.vocabulary_ontology_id();
        self.engine.add_node(&vocab_ontology, vocab_type.into_node())?;

        let category_node = VocabCategory::new(&final_category);
        let category_id = category_node.node_id();
        self.engine.with_ontology_mut(&vocab_ontology, |ontology| {
            if ontology.get_node(&category_id).is_none() {
                ontology.add_node(category_node.into_node());
            }
        })?;
        self.engine
            .add_edge(&vocab_ontology, Edge::structural(vocab_type_id.clone(), category_id, IN_CATEGORY))?;

        if let Some(embedding) = embedding {
            self.detect_synonyms(name, &embedding)?;
        }

        Ok(AddOutcome::Created)
    }

    /// When `category == "llm_generated"` and an embedding exists, runs the
    /// probabilistic categorizer (§4.5.1); otherwise the caller's category is
    /// taken as a builtin assignment.
    fn resolve_category(
        &self,
        category: &str,
        embedding: Option<&[f32]>,
    ) -> VocabularyResult<(String, String, Option<f32>, Option<HashMap<String, f32>>, bool)> {
        if category != LLM_GENERATED {
            return Ok((category.to_string(), "builtin".to_string(), None, None, false));
        }
        let Some(embedding) = embedding else {
            return Ok((category.to_string(), "builtin".to_string(), None, None, false));
        };
        let category_embeddings = self.category_mean_embeddings()?;
        match categorizer::categorize(embedding, &category_embeddings) {
            Some(CategoryAssignment { category, confidence, scores, ambiguous }) => {
                Ok((category, "computed".to_string(), Some(confidence), Some(scores), ambiguous))
            }
            None => Ok((category.to_string(), "builtin".to_string(), None, None, false)),
        }
    }

    fn category_mean_embeddings(&self) -> VocabularyResult<HashMap<String, Vec<f32>>> {
        let mut sums: HashMap<String, (Vec<f32>, usize)> = HashMap::new();
        for row in self.store.list_all()? {
            if !row.is_active {
                continue;
            }
            let Some(embedding) = row.embedding else { continue };
            let entry = sums.entry(row.category).or_insert_with(|| (vec![0.0; embedding.len()], 0));
            if entry.0.len() != embedding.len() {
                continue;
            }
            for (sum, value) in entry.0.iter_mut().zip(embedding.iter()) {
                *sum += value;
            }
            entry.1 += 1;
        }
        Ok(sums
            .into_iter()
            .filter(|(_, (_, count))| *count > 0)
            .map(|(category, (sum, count))| {
                let mean: Vec<f32> = sum.iter().map(|v| v / count as f32).collect();
                (category, mean)
            })
            .collect())
    }

    /// Partial update (§4.5 step 2).
    pub fn update(&self, name: &str, patch: VocabularyPatch) -> VocabularyResult<bool> {
        Ok(self.store.update(name, &patch)?)
    }

    /// Merge `deprecated_type` into `target_type` across every ontology's
    /// concept graph (§4.5 step 3): every edge of the deprecated type is
    /// replaced by a fresh edge of the target type with copied-forward
    /// properties, never mutated in place.
    pub fn merge(
        &self,
        deprecated_type: &str,
        target_type: &str,
        performed_by: &str,
        reason: Option<String>,
    ) -> VocabularyResult<usize> {
        let vocab_ontology = self.vocabulary_ontology_id();
        let mut rewritten = 0;
        for ontology_id in self.engine.list_ontology_ids() {
            if ontology_id == vocab_ontology {
                continue;
            }
            rewritten += self.rewrite_edges_in_ontology(&ontology_id, deprecated_type, target_type)?;
        }

        let dep_reason = format!("Merged into {target_type}");
        self.store.deactivate(deprecated_type, &dep_reason)?;
        self.store.append_history(&VocabularyHistoryInsert {
            action: "merged".to_string(),
            type_name: deprecated_type.to_string(),
            performed_by: performed_by.to_string(),
            target_type: Some(target_type.to_string()),
            reason,
        })?;
        Ok(rewritten)
    }

    fn rewrite_edges_in_ontology(
        &self,
        ontology_id: &OntologyId,
        deprecated_type: &str,
        target_type: &str,
    ) -> VocabularyResult<usize> {
        Ok(self.engine.with_ontology_mut(ontology_id, |ontology| {
            let matching: Vec<Edge> = ontology.edges().filter(|e| e.relationship == deprecated_type).cloned().collect();
            let mut count = 0;
            for old_edge in matching {
                let new_edge = Edge {
                    id: crate::graph::EdgeId::new(),
                    source: old_edge.source.clone(),
                    target: old_edge.target.clone(),
                    relationship: target_type.to_string(),
                    provenance: old_edge.provenance.clone(),
                    properties: old_edge.properties.clone(),
                };
                ontology.remove_edge(&old_edge.id);
                ontology.add_edge(new_edge);
                count += 1;
            }
            count
        })?)
    }

    /// Enumerate relationship types used in `ontology_id`'s concept graph and
    /// register any uppercase, non-blacklisted, not-yet-registered type as a
    /// new `llm_generated` VocabType (§4.5 step 4).
    pub async fn sync_from_graph(&self, ontology_id: &OntologyId, dry_run: bool) -> VocabularyResult<Vec<String>> {
        let ontology = self
            .engine
            .get_ontology(ontology_id)
            .ok_or_else(|| VocabularyError::OntologyNotFound(ontology_id.to_string()))?;

        let mut distinct_types: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for edge in ontology.edges() {
            distinct_types.insert(edge.relationship.clone());
        }

        let mut newly_registered = Vec::new();
        for relationship_type in distinct_types {
            if relationship_type.is_empty() || relationship_type.chars().any(|c| c.is_lowercase()) {
                continue;
            }
            if SYSTEM_TYPE_BLACKLIST.contains(&relationship_type.as_str()) {
                continue;
            }
            if self.store.get(&relationship_type)?.is_some() {
                continue;
            }
            newly_registered.push(relationship_type.clone());
            if !dry_run {
                self.add(&relationship_type, LLM_GENERATED, None, "system", false, None).await?;
            }
        }
        Ok(newly_registered)
    }

    /// Get/update a single type's embedding (§4.5 step 5).
    pub fn get_embedding(&self, name: &str) -> VocabularyResult<Option<Vec<f32>>> {
        Ok(self.store.get(name)?.and_then(|row| row.embedding))
    }

    /// Active VocabType names, the set the ingestion pipeline's relationship-type
    /// matcher (§4.7 step 2) resolves freshly extracted types against.
    pub fn list_active_type_names(&self) -> VocabularyResult<Vec<String>> {
        Ok(self.store.list_all()?.into_iter().filter(|row| row.is_active).map(|row| row.name).collect())
    }

    pub async fn regenerate_embeddings(&self, scope: RegenerateScope) -> VocabularyResult<usize> {
        let Some(embedder) = self.embedder.clone() else { return Ok(0) };
        let targets = match scope {
            RegenerateScope::All => self.store.list_all()?,
            RegenerateScope::MissingOnly => self.store.list_missing_embeddings()?,
            RegenerateScope::IncompatibleWith { model, dimensions } => {
                self.store.list_incompatible_embeddings(&model, dimensions)?
            }
        };

        let mut updated = 0;
        for row in targets {
            let embedding = embedder.embed(&row.name).await.map_err(VocabularyError::Ai)?;
            self.store.set_embedding(&row.name, &embedding, &self.embedding_model)?;
            self.detect_synonyms(&row.name, &embedding)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Embed-new/compare-against-cache/emit-symmetric-`SIMILAR_TO`-pairs,
    /// grounded in the teacher's `EmbeddingSimilarityEnrichment` (§0 / the
    /// vocabulary grounding note): the VocabType-node analogue of its
    /// concept-node synonym detection.
    fn detect_synonyms(&self, name: &str, embedding: &[f32]) -> VocabularyResult<Vec<String>> {
        let Some(cache) = &self.synonym_cache else { return Ok(Vec::new()) };
        let vocab_ontology = self.vocabulary_ontology_id();
        let this_id = VocabType::new(name).node_id();

        let similar = cache.find_similar(VOCABULARY_ONTOLOGY, embedding, self.synonym_threshold);
        let mut synonyms = Vec::new();

        for (other_id, similarity) in similar {
            if other_id == this_id {
                continue;
            }
            let already_linked = self
                .engine
                .get_ontology(&vocab_ontology)
                .map(|o| o.edges_from(&this_id).any(|e| e.relationship == SIMILAR_TO && e.target == other_id))
                .unwrap_or(false);
            if !already_linked {
                self.engine.add_edge(
                    &vocab_ontology,
                    Edge::structural(this_id.clone(), other_id.clone(), SIMILAR_TO).with_property("similarity", similarity),
                )?;
            }
            let reverse_linked = self
                .engine
                .get_ontology(&vocab_ontology)
                .map(|o| o.edges_from(&other_id).any(|e| e.relationship == SIMILAR_TO && e.target == this_id))
                .unwrap_or(false);
            if !reverse_linked {
                self.engine.add_edge(
                    &vocab_ontology,
                    Edge::structural(other_id.clone(), this_id.clone(), SIMILAR_TO).with_property("similarity", similarity),
                )?;
            }
            synonyms.push(other_id.as_str().to_string());
        }

        cache.store(VOCABULARY_ONTOLOGY, &this_id, embedding.to_vec());
        if !synonyms.is_empty() {
            self.store.set_synonyms(name, &synonyms)?;
        }
        Ok(synonyms)
    }
}
