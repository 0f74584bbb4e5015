//! noema: a self-maintaining knowledge graph engine.
//!
//! Documents and images are ingested into a property graph of Concepts,
//! Sources, and Instances; a vocabulary manager keeps the relationship-type
//! side table it is built on sane (synonym detection, categorization,
//! deprecation); a grounding engine and epistemic status service measure
//! how well-supported each relationship type is across the graph; and a
//! scheduler drives the maintenance work (vocabulary consolidation,
//! epistemic remeasurement, projection refresh, artifact cleanup) off
//! those measurements, one job at a time through a worker pool.
//!
//! # Layering
//!
//! - [`graph`] (L1): property-graph primitives, `GraphEngine`'s in-memory
//!   cache, SQLite persistence (`storage`).
//! - [`store`] (L2): a namespace-safe query facade over `graph`/`storage`.
//! - [`objectstore`] (L3): the S3-compatible client for source documents,
//!   images, and cached projections.
//! - [`ai`] (L4): provider-agnostic extraction/embedding/vision traits.
//! - [`vocabulary`] (L5): the relationship-type side table.
//! - [`chunker`] (L6): document-to-chunk splitting.
//! - [`ingestion`] (L7): chunk-by-chunk graph construction with checkpointing.
//! - [`grounding`] (L8): polarity-axis projection of relationship types.
//! - [`epistemic`] (L9): per-relationship-type epistemic status measurement.
//! - [`jobs`] (L10): the persisted maintenance/ingestion job queue.
//! - [`scheduler`] (L11): launchers that enqueue maintenance jobs.
//! - [`metrics`] (L12): monotonic graph-change counters.
//! - [`checkpoint`] (L13): crash-resumable per-document ingestion state.
//! - [`projection`] (L14): the cached 2D/3D layout contract.
//! - [`config`] (L15): provider policy, embedding config, object storage
//!   credentials.

pub mod ai;
pub mod checkpoint;
pub mod chunker;
pub mod config;
pub mod epistemic;
pub mod graph;
pub mod grounding;
pub mod ingestion;
pub mod jobs;
pub mod metrics;
pub mod objectstore;
pub mod projection;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod vocabulary;

pub use ai::{AiError, AiResult, Embedder, Extractor, InMemoryVectorStore, VectorStore, Vision};
pub use config::{ConfigError, ConfigResult, ConfigService, EmbeddingConfig, ObjectStorageCredentials, ProviderPolicy};
pub use graph::{
    Concept, DocumentMeta, Edge, EdgeId, EdgeProvenance, EdgeSource, GraphEngine, GraphEngineError,
    GraphEngineResult, Instance, Node, NodeId, NodeLabel, Ontology, OntologyId, PropertyValue, SourceRecord,
    VocabType, VOCABULARY_ONTOLOGY,
};
pub use ingestion::{IngestionError, IngestionOutcome, IngestionPipeline, IngestionRequest, IngestionResult};
pub use jobs::{Job, JobError, JobQueue, JobResult, JobStatus, JobWorker, WorkerRegistry};
pub use scheduler::{Launcher, Scheduler, SchedulerError, SchedulerResult};
pub use store::{GraphStats, QueryFacade, QueryFacadeError, QueryFacadeResult};
pub use vocabulary::{VocabularyError, VocabularyManager, VocabularyResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
