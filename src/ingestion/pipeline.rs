//! The ingestion pipeline itself (L7, SPEC_FULL §4.7): chunk, extract,
//! upsert-by-meaning, link, checkpoint, repeat — strictly chunk-by-chunk,
//! since later chunks resolve relationship endpoints against concepts
//! upserted by earlier ones.
//!
//! Grounded in the teacher's sink/emission contract: one `IngestionPipeline`
//! instance per worker, reused across jobs, the way `PlexusEngine` is reused
//! across `adapter` calls rather than rebuilt per request.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::ai::{with_retry, AiError, Embedder, Extractor, RetryPolicy, VectorStore, Vision};
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::chunker::{chunk_document, Chunk, ChunkerConfig};
use crate::graph::{
    Concept, DocumentMeta, DocumentSourceType, Edge, EdgeProvenance, EdgeSource, GraphEngine, GraphEngineError,
    Instance, NodeId, NodeLabel, Ontology, SourceContentType, SourceRecord, APPEARS, EVIDENCED_BY, FROM_SOURCE,
    HAS_SOURCE,
};
use crate::jobs::{JobError, JobQueue};
use crate::metrics::{
    GraphMetrics, MetricsError, CONCEPT_CREATION_COUNTER, DOCUMENT_INGESTION_COUNTER,
    RELATIONSHIP_CREATION_COUNTER,
};
use crate::objectstore::{ObjectStorageClient, ObjectStorageError};
use crate::vocabulary::{VocabularyError, VocabularyManager};

use super::type_matcher;

/// Concept similarity at/above which an extracted concept merges into an
/// existing one instead of creating a new node (§4.7 step 3's
/// `UPSERT_THRESHOLD`).
pub const UPSERT_THRESHOLD: f32 = 0.85;

/// Context window carried forward chunk-to-chunk (§4.7 step 1): up to 50
/// `(concept_id, label)` pairs.
const CONTEXT_WINDOW_SIZE: usize = 50;

/// §4.7 step 1: besides a document's own recent concepts, the context window
/// also seeds from the concepts appearing in this many of the ontology's most
/// recently created paragraphs, so a fresh document landing in an already-active
/// ontology still upserts against what sibling documents just talked about.
const CONTEXT_ONTOLOGY_PARAGRAPH_LOOKBACK: usize = 3;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphEngineError),
    #[error("object storage error: {0}")]
    ObjectStorage(#[from] ObjectStorageError),
    #[error("ai provider error: {0}")]
    Ai(#[from] AiError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
    #[error("job queue error: {0}")]
    Job(#[from] JobError),
    #[error("extraction returned malformed output: {0}")]
    MalformedExtraction(String),
    #[error("image ingestion requires a vision provider")]
    VisionUnavailable,
}

pub type IngestionResult<T> = Result<T, IngestionError>;

/// What's being ingested: a text document, or an image routed through the
/// vision subflow (§4.7's "image ingestion prefix").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestionInput {
    Document { filename: String, bytes: Vec<u8> },
    Image { filename: String, bytes: Vec<u8>, ext: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub ontology: String,
    pub document_name: String,
    pub ingested_by: String,
    pub job_id: String,
    pub source_type: DocumentSourceType,
    pub input: IngestionInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionStats {
    pub concepts_created: u64,
    pub concepts_linked: u64,
    pub sources_created: u64,
    pub instances_created: u64,
    pub relationships_created: u64,
}

impl From<crate::checkpoint::IngestionStats> for IngestionStats {
    fn from(s: crate::checkpoint::IngestionStats) -> Self {
        Self {
            concepts_created: s.concepts_created,
            concepts_linked: s.concepts_linked,
            sources_created: s.sources_created,
            instances_created: s.instances_created,
            relationships_created: s.relationships_created,
        }
    }
}

#[derive(Debug)]
pub enum IngestionOutcome {
    AlreadyIngested { document_id: String },
    Ingested { document_id: String, stats: IngestionStats },
}

#[derive(Debug, Deserialize)]
struct ExtractedConcept {
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    search_terms: Vec<String>,
    #[serde(default)]
    quotes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedRelationship {
    from_label: String,
    to_label: String,
    #[serde(rename = "type")]
    relationship_type: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    concepts: Vec<ExtractedConcept>,
    #[serde(default)]
    relationships: Vec<ExtractedRelationship>,
}

pub struct IngestionPipeline {
    engine: Arc<GraphEngine>,
    object_store: Arc<ObjectStorageClient>,
    vocabulary: Arc<VocabularyManager>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
    vision: Option<Arc<dyn Vision>>,
    vector_store: Arc<dyn VectorStore>,
    checkpoints: Arc<CheckpointStore>,
    metrics: Arc<GraphMetrics>,
    chunker_config: ChunkerConfig,
    retry_policy: RetryPolicy,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<GraphEngine>,
        object_store: Arc<ObjectStorageClient>,
        vocabulary: Arc<VocabularyManager>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn Extractor>,
        vector_store: Arc<dyn VectorStore>,
        checkpoints: Arc<CheckpointStore>,
        metrics: Arc<GraphMetrics>,
    ) -> Self {
        Self {
            engine,
            object_store,
            vocabulary,
            embedder,
            extractor,
            vision: None,
            vector_store,
            checkpoints,
            metrics,
            chunker_config: ChunkerConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn Vision>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.chunker_config = config;
        self
    }

    pub async fn ingest(&self, request: IngestionRequest) -> IngestionResult<IngestionOutcome> {
        let ontology_id = self.engine.ontology_id_for_name(&request.ontology);

        let (bytes, filename, text, source_content_type, storage_key, visual_embedding) =
            self.materialize_input(&request.ontology, request.input).await?;
        let content_hash = hex_sha256(&bytes);

        if let Some(existing) = self.find_document_meta(&ontology_id, &content_hash)? {
            info!(document_id = %existing, ontology = %request.ontology, "document already ingested, no-op");
            return Ok(IngestionOutcome::AlreadyIngested { document_id: existing });
        }

        let chunks = chunk_document(&filename, &text, &self.chunker_config, Some(self.extractor.clone())).await;

        let checkpoint_name = request.document_name.clone();
        let mut checkpoint = match self.checkpoints.load_and_validate(&checkpoint_name, &bytes) {
            Ok(Some(existing)) => existing,
            Ok(None) => Checkpoint::new(checkpoint_name.clone(), filename.clone(), &bytes),
            Err(CheckpointError::Corrupt(reason)) => {
                warn!(document = %checkpoint_name, reason, "discarding stale checkpoint, restarting from chunk 0");
                Checkpoint::new(checkpoint_name.clone(), filename.clone(), &bytes)
            }
            Err(err) => return Err(err.into()),
        };

        let resume_from = checkpoint.chunks_processed as usize;
        let mut label_to_concept: HashMap<String, NodeId> = HashMap::new();

        let ontology_snapshot = self.engine.get_ontology(&ontology_id);
        let mut context_window: VecDeque<(String, String)> = checkpoint
            .recent_concept_ids
            .iter()
            .filter_map(|id| {
                let node_id = NodeId::from_string(id.clone());
                ontology_snapshot
                    .as_ref()
                    .and_then(|o| o.get_node(&node_id))
                    .and_then(Concept::from_node)
                    .map(|c| (id.clone(), c.label))
            })
            .collect();

        if resume_from == 0 {
            if let Some(ontology) = ontology_snapshot.as_ref() {
                let seen: std::collections::HashSet<String> =
                    context_window.iter().map(|(id, _)| id.clone()).collect();
                let mut added = 0usize;
                for (concept_id, label) in gather_ontology_recent_concepts(ontology, CONTEXT_ONTOLOGY_PARAGRAPH_LOOKBACK)
                {
                    if seen.contains(concept_id.as_str()) {
                        continue;
                    }
                    push_context(&mut context_window, concept_id, label);
                    added += 1;
                }
                if added == 0 && context_window.is_empty() {
                    info!(ontology = %request.ontology, "no ontology-wide recent concepts to seed context window");
                } else if added > 0 {
                    info!(ontology = %request.ontology, added, "seeded context window from ontology-wide recent paragraphs");
                }
            }
        }

        let mut created_source_ids: Vec<NodeId> = Vec::new();

        for chunk in chunks.iter().skip(resume_from) {
            self.ingest_chunk(
                &ontology_id,
                &request,
                &content_hash,
                chunk,
                source_content_type,
                visual_embedding.as_ref(),
                storage_key.as_deref(),
                &mut context_window,
                &mut label_to_concept,
                &mut checkpoint,
                &mut created_source_ids,
            )
            .await?;
            self.checkpoints.save(&checkpoint)?;
        }

        let document_meta = DocumentMeta::new(
            content_hash.clone(),
            request.ontology.clone(),
            request.ingested_by.clone(),
            request.job_id.clone(),
            request.source_type,
        );
        let mut document_meta = document_meta;
        document_meta.source_count = created_source_ids.len() as i64;
        document_meta.filename = Some(filename);
        document_meta.garage_key = storage_key;
        let document_id = document_meta.document_id.clone();
        let document_node_id = document_meta.node_id();

        self.engine.with_ontology_mut(&ontology_id, |ontology| {
            ontology.add_node(document_meta.into_node());
            for source_id in &created_source_ids {
                ontology.add_edge(Edge::structural(document_node_id.clone(), source_id.clone(), HAS_SOURCE));
            }
        })?;
        self.metrics.increment(DOCUMENT_INGESTION_COUNTER)?;
        self.vocabulary.sync_from_graph(&ontology_id, false).await?;
        self.checkpoints.delete(&checkpoint_name)?;

        Ok(IngestionOutcome::Ingested { document_id, stats: checkpoint.stats.into() })
    }

    /// Resolve `request.input` into the bytes/text the chunker consumes,
    /// uploading the blob to object storage content-addressed along the way
    /// (§4.7 "write the blob once"). Images run the vision subflow (§4.7
    /// "image ingestion prefix") first: visual embedding + vision prose.
    async fn materialize_input(
        &self,
        ontology: &str,
        input: IngestionInput,
    ) -> IngestionResult<(Vec<u8>, String, String, SourceContentType, Option<String>, Option<Vec<f32>>)> {
        match input {
            IngestionInput::Document { filename, bytes } => {
                let ext = extension_of(&filename).unwrap_or("txt");
                let key = self.object_store.upload_source_document(ontology, bytes.clone(), ext).await?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok((bytes, filename, text, SourceContentType::Document, Some(key), None))
            }
            IngestionInput::Image { filename, bytes, ext } => {
                let Some(vision) = &self.vision else { return Err(IngestionError::VisionUnavailable) };
                let content_type = ext.as_deref().unwrap_or("png");
                let prose = with_retry(self.retry_policy, || {
                    vision.describe("Describe this image literally and exhaustively.", &bytes, content_type)
                })
                .await?;
                let embedding = self.embedder.embed(&prose).await?;
                let visual_embedding = normalize(embedding);
                let key = self
                    .object_store
                    .upload_image(ontology, &hex_sha256(&bytes), bytes.clone(), ext.as_deref())
                    .await?;
                Ok((bytes, filename, prose, SourceContentType::Image, Some(key), Some(visual_embedding)))
            }
        }
    }

    fn find_document_meta(&self, ontology_id: &crate::graph::OntologyId, content_hash: &str) -> IngestionResult<Option<String>> {
        let Some(ontology) = self.engine.get_ontology(ontology_id) else { return Ok(None) };
        Ok(ontology
            .nodes()
            .filter(|n| n.label == NodeLabel::DocumentMeta)
            .filter_map(DocumentMeta::from_node)
            .find(|dm| dm.content_hash == content_hash)
            .map(|dm| dm.document_id))
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest_chunk(
        &self,
        ontology_id: &crate::graph::OntologyId,
        request: &IngestionRequest,
        content_hash: &str,
        chunk: &Chunk,
        source_content_type: SourceContentType,
        visual_embedding: Option<&Vec<f32>>,
        image_storage_key: Option<&str>,
        context_window: &mut VecDeque<(String, String)>,
        label_to_concept: &mut HashMap<String, NodeId>,
        checkpoint: &mut Checkpoint,
        created_source_ids: &mut Vec<NodeId>,
    ) -> IngestionResult<()> {
        if context_window.is_empty() && chunk.chunk_number == 0 {
            info!(ontology = %request.ontology, "empty context window on first chunk of document");
        }

        let active_types = self.vocabulary.list_active_type_names()?;
        let prompt = build_extraction_prompt(context_window, &active_types);
        let extraction: serde_json::Value =
            with_retry(self.retry_policy, || self.extractor.extract(&prompt, &chunk.text)).await?;
        let payload: ExtractionPayload =
            serde_json::from_value(extraction).map_err(|e| IngestionError::MalformedExtraction(e.to_string()))?;

        // Step 4: this chunk's Source node.
        let source_id_str = format!("{}_chunk{}", &content_hash[..content_hash.len().min(12)], chunk.chunk_number);
        let mut source = SourceRecord::new(request.ontology.clone(), chunk.chunk_number as i64, chunk.text.clone());
        source.source_id = NodeId::from_string(source_id_str);
        source.content_type = source_content_type;
        source.content_hash = Some(content_hash.to_string());
        source.char_offset_start = Some(chunk.start_position as i64);
        source.char_offset_end = Some(chunk.end_position as i64);
        source.chunk_index = Some(chunk.chunk_number as i64);
        source.visual_embedding = visual_embedding.cloned();
        if matches!(source_content_type, SourceContentType::Image) {
            source.storage_key = image_storage_key.map(str::to_string);
        }
        let source_id = source.source_id.clone();

        self.engine.with_ontology_mut(ontology_id, |o| {
            o.add_node(source.into_node());
        })?;
        created_source_ids.push(source_id.clone());
        checkpoint.stats.sources_created += 1;

        // Step 3: upsert each extracted concept by meaning.
        for concept in &payload.concepts {
            let embedding = self.embedder.embed(&format!("{}: {}", concept.label, concept.description)).await?;
            let existing = self
                .vector_store
                .find_similar(ontology_id.as_str(), &embedding, UPSERT_THRESHOLD)
                .into_iter()
                .next();

            let concept_id = match existing {
                Some((node_id, _similarity)) => {
                    self.engine.with_ontology_mut(ontology_id, |o| {
                        if let Some(node) = o.get_node_mut(&node_id) {
                            if let Some(mut existing_concept) = Concept::from_node(node) {
                                for term in &concept.search_terms {
                                    if !existing_concept.search_terms.contains(term) {
                                        existing_concept.search_terms.push(term.clone());
                                    }
                                }
                                *node = existing_concept.into_node();
                            }
                        }
                    })?;
                    checkpoint.stats.concepts_linked += 1;
                    node_id
                }
                None => {
                    let new_concept = Concept::new(concept.label.clone(), concept.description.clone(), embedding.clone())
                        .with_search_terms(concept.search_terms.clone());
                    let new_id = new_concept.concept_id.clone();
                    self.engine.with_ontology_mut(ontology_id, |o| {
                        o.add_node(new_concept.into_node());
                    })?;
                    self.vector_store.store(ontology_id.as_str(), &new_id, embedding);
                    self.metrics.increment(CONCEPT_CREATION_COUNTER)?;
                    checkpoint.stats.concepts_created += 1;
                    new_id
                }
            };

            label_to_concept.insert(concept.label.clone(), concept_id.clone());
            push_context(context_window, concept_id.as_str().to_string(), concept.label.clone());
            checkpoint.push_recent_concept(concept_id.as_str().to_string());

            // Step 6: Concept -[:APPEARS]-> Source, plus MERGE-by-quote Instances.
            self.engine.with_ontology_mut(ontology_id, |o| {
                let already_appears = o.edges_from(&concept_id).any(|e| e.relationship == APPEARS && e.target == source_id);
                if !already_appears {
                    o.add_edge(Edge::structural(concept_id.clone(), source_id.clone(), APPEARS));
                }
            })?;

            for quote in &concept.quotes {
                let existing_instance = self.engine.get_ontology(ontology_id).and_then(|o| {
                    o.edges_to(&source_id)
                        .filter(|e| e.relationship == FROM_SOURCE)
                        .find(|e| o.get_node(&e.source).and_then(Instance::from_node).map(|i| &i.quote == quote).unwrap_or(false))
                        .map(|e| e.source.clone())
                });

                let instance_id = match existing_instance {
                    Some(id) => id,
                    None => {
                        let instance = Instance::new(quote.clone());
                        let instance_id = instance.instance_id.clone();
                        self.engine.with_ontology_mut(ontology_id, |o| {
                            o.add_node(instance.into_node());
                            o.add_edge(Edge::structural(instance_id.clone(), source_id.clone(), FROM_SOURCE));
                        })?;
                        checkpoint.stats.instances_created += 1;
                        instance_id
                    }
                };

                self.engine.with_ontology_mut(ontology_id, |o| {
                    let already_evidenced =
                        o.edges_from(&concept_id).any(|e| e.relationship == EVIDENCED_BY && e.target == instance_id);
                    if !already_evidenced {
                        o.add_edge(Edge::structural(concept_id.clone(), instance_id.clone(), EVIDENCED_BY));
                    }
                })?;
            }
        }

        // Step 6/2: register/normalize relationship types, then create edges.
        for relationship in &payload.relationships {
            let (Some(from_id), Some(to_id)) =
                (label_to_concept.get(&relationship.from_label).cloned(), label_to_concept.get(&relationship.to_label).cloned())
            else {
                warn!(from = %relationship.from_label, to = %relationship.to_label, "relationship endpoint not yet upserted, skipping");
                continue;
            };

            let active_types = self.vocabulary.list_active_type_names()?;
            let relationship_type = match type_matcher::resolve(&relationship.relationship_type, &active_types) {
                Some(existing) => existing.to_string(),
                None => {
                    let canonical = type_matcher::canonicalize(&relationship.relationship_type);
                    self.vocabulary.add(&canonical, "llm_generated", None, "system", false, None).await?;
                    canonical
                }
            };

            let provenance = EdgeProvenance::new(relationship_type.clone(), EdgeSource::LlmExtraction)
                .with_confidence(relationship.confidence.clamp(0.0, 1.0))
                .with_job_id(request.job_id.clone())
                .with_document_id(content_hash.to_string());

            self.engine
                .add_edge(ontology_id, Edge::new(from_id, to_id, relationship_type, provenance))?;
            self.metrics.increment(RELATIONSHIP_CREATION_COUNTER)?;
            checkpoint.stats.relationships_created += 1;
        }

        checkpoint.advance(chunk.end_position as u64);
        Ok(())
    }

    /// Ontology-deletion cascade (§4.7): Instance -> Source -> object-storage
    /// blob -> DocumentMeta -> orphan Concepts -> job rows, scoped to one
    /// document so sibling documents in the same ontology are untouched.
    pub async fn delete_document(&self, ontology: &str, document_id: &str, jobs: &JobQueue) -> IngestionResult<()> {
        let ontology_id = self.engine.ontology_id_for_name(ontology);
        let Some(snapshot) = self.engine.get_ontology(&ontology_id) else { return Ok(()) };

        let document_node_id = NodeId::from_string(document_id.to_string());
        let Some(document_meta) = snapshot.get_node(&document_node_id).and_then(DocumentMeta::from_node) else {
            return Ok(());
        };

        let source_ids: Vec<NodeId> = snapshot
            .edges_from(&document_node_id)
            .filter(|e| e.relationship == HAS_SOURCE)
            .map(|e| e.target.clone())
            .collect();

        for source_id in &source_ids {
            let instance_ids: Vec<NodeId> = snapshot
                .edges_to(source_id)
                .filter(|e| e.relationship == FROM_SOURCE)
                .map(|e| e.source.clone())
                .collect();
            self.engine.with_ontology_mut(&ontology_id, |o| {
                for instance_id in &instance_ids {
                    o.remove_node(instance_id);
                }
            })?;
        }

        if let Some(ref garage_key) = document_meta.garage_key {
            if let Err(err) = self.object_store.delete(garage_key).await {
                warn!(key = %garage_key, error = %err, "failed to delete source blob during ontology cascade");
            }
        }

        self.engine.with_ontology_mut(&ontology_id, |o| {
            for source_id in &source_ids {
                o.remove_node(source_id);
            }
            o.remove_node(&document_node_id);
        })?;

        // Orphan concepts: no remaining APPEARS edges anywhere in this ontology.
        if let Some(ontology) = self.engine.get_ontology(&ontology_id) {
            let orphan_ids: Vec<NodeId> = ontology
                .nodes()
                .filter(|n| n.label == NodeLabel::Concept)
                .map(|n| n.id.clone())
                .filter(|id| !ontology.edges_from(id).any(|e| e.relationship == APPEARS))
                .collect();
            self.engine.with_ontology_mut(&ontology_id, |o| {
                for id in orphan_ids {
                    o.remove_node(&id);
                }
            })?;
        }

        jobs.delete_jobs_by_ontology(ontology)?;
        Ok(())
    }
}

fn push_context(window: &mut VecDeque<(String, String)>, concept_id: String, label: String) {
    window.retain(|(id, _)| id != &concept_id);
    window.push_back((concept_id, label));
    while window.len() > CONTEXT_WINDOW_SIZE {
        window.pop_front();
    }
}

/// §4.7 step 1's cross-document half of the context window: walks every
/// Source node in `ontology`, newest `created_at` first, and collects the
/// concepts `APPEARS`-linked to the first `paragraph_lookback` distinct
/// `(document, paragraph)` pairs it sees. Most recent paragraph first, so
/// `push_context` below keeps the freshest concept on a duplicate label.
fn gather_ontology_recent_concepts(ontology: &Ontology, paragraph_lookback: usize) -> Vec<(String, String)> {
    let mut sources: Vec<_> = ontology.nodes().filter(|n| n.label == NodeLabel::Source).collect();
    sources.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut seen_paragraphs: std::collections::HashSet<(String, i64)> = std::collections::HashSet::new();
    let mut concepts = Vec::new();
    for source in sources {
        let paragraph = source.get("paragraph").and_then(crate::graph::PropertyValue::as_i64).unwrap_or(0);
        let document = source.get_str("document").unwrap_or_default().to_string();
        let key = (document, paragraph);
        if seen_paragraphs.len() >= paragraph_lookback && !seen_paragraphs.contains(&key) {
            break;
        }
        seen_paragraphs.insert(key);

        for edge in ontology.edges_to(&source.id) {
            if edge.relationship != APPEARS {
                continue;
            }
            if let Some(concept) = ontology.get_node(&edge.source).and_then(Concept::from_node) {
                concepts.push((edge.source.as_str().to_string(), concept.label));
            }
        }
    }
    concepts
}

fn build_extraction_prompt(context_window: &VecDeque<(String, String)>, active_types: &[String]) -> String {
    let context_json = serde_json::to_string(
        &context_window.iter().map(|(id, label)| serde_json::json!({"concept_id": id, "label": label})).collect::<Vec<_>>(),
    )
    .unwrap_or_default();
    format!(
        "Extract concepts and relationships as JSON {{concepts: [...], relationships: [...]}}.\n\
         Active vocabulary: {}\n\
         Context window: {}",
        active_types.join(", "),
        context_json
    )
}

fn extension_of(filename: &str) -> Option<&str> {
    filename.rsplit('.').next().filter(|ext| *ext != filename)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::providers::mock::MockProvider;
    use crate::ai::InMemoryVectorStore;
    use crate::config::ObjectStorageCredentials;
    use crate::vocabulary::{VocabularyManager, VocabularyStore};

    fn test_pipeline() -> (IngestionPipeline, Arc<JobQueue>) {
        let engine = Arc::new(GraphEngine::new());
        let credentials = ObjectStorageCredentials {
            endpoint: "http://localhost:9000".into(),
            bucket: "test".into(),
            access_key: "k".into(),
            secret_key: "s".into(),
        };
        let object_store = Arc::new(ObjectStorageClient::new(credentials));
        let vocab_store = VocabularyStore::open_in_memory().unwrap();
        let vocabulary = Arc::new(VocabularyManager::new(vocab_store, engine.clone()));
        let embedder: Arc<dyn Embedder> = Arc::new(MockProvider::with_dimensions(8));
        let extraction = serde_json::json!({
            "concepts": [{"label": "travel", "description": "moving between places", "search_terms": [], "quotes": ["people travel often"]}],
            "relationships": []
        });
        let extractor: Arc<dyn Extractor> = Arc::new(MockProvider::with_extraction(extraction));
        let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = Arc::new(CheckpointStore::new(dir.path()));
        let metrics = Arc::new(GraphMetrics::open_in_memory().unwrap());
        let jobs = Arc::new(JobQueue::open_in_memory().unwrap());

        let pipeline =
            IngestionPipeline::new(engine, object_store, vocabulary, embedder, extractor, vector_store, checkpoints, metrics);
        (pipeline, jobs)
    }

    #[tokio::test]
    async fn ingesting_a_document_creates_concepts_and_sources() {
        let (pipeline, _jobs) = test_pipeline();
        let request = IngestionRequest {
            ontology: "acme".into(),
            document_name: "notes.md".into(),
            ingested_by: "tester".into(),
            job_id: "job-1".into(),
            source_type: DocumentSourceType::File,
            input: IngestionInput::Document { filename: "notes.md".into(), bytes: b"# Title\n\nSome travel notes.\n".to_vec() },
        };
        let outcome = pipeline.ingest(request).await.unwrap();
        match outcome {
            IngestionOutcome::Ingested { stats, .. } => {
                assert!(stats.concepts_created >= 1);
                assert!(stats.sources_created >= 1);
            }
            other => panic!("expected Ingested, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn re_ingesting_identical_bytes_is_a_no_op() {
        let (pipeline, _jobs) = test_pipeline();
        let bytes = b"# Title\n\nSome travel notes.\n".to_vec();
        let request = |bytes: Vec<u8>| IngestionRequest {
            ontology: "acme".into(),
            document_name: "notes.md".into(),
            ingested_by: "tester".into(),
            job_id: "job-1".into(),
            source_type: DocumentSourceType::File,
            input: IngestionInput::Document { filename: "notes.md".into(), bytes },
        };
        pipeline.ingest(request(bytes.clone())).await.unwrap();
        let second = pipeline.ingest(request(bytes)).await.unwrap();
        assert!(matches!(second, IngestionOutcome::AlreadyIngested { .. }));
    }
}
