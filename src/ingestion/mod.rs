//! Ingestion (L7, SPEC_FULL §4.7): turns a document or image into graph
//! nodes and edges, chunk by chunk, with crash-resumable checkpointing.

mod pipeline;
mod type_matcher;

pub use pipeline::{
    IngestionError, IngestionInput, IngestionOutcome, IngestionPipeline, IngestionRequest, IngestionResult,
    IngestionStats, UPSERT_THRESHOLD,
};
pub use type_matcher::{canonicalize, resolve};
