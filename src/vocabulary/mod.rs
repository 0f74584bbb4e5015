//! Vocabulary Manager (L5, SPEC_FULL §4.5): the relational side table of
//! relationship-type metadata (embedding, category scoring, synonyms) that
//! sits alongside the graph-wide `VocabType`/`VocabCategory` nodes.
//!
//! Grounded in the teacher's `adapter::embedding::EmbeddingSimilarityEnrichment`
//! (examples/nrgforge-plexus/src/adapter/embedding.rs): the same
//! embed-new/compare-against-cache/emit-symmetric-edge-pairs shape, retargeted
//! from concept nodes to VocabType nodes for synonym detection.

mod categorizer;
mod manager;
mod store;

pub use categorizer::{categorize, CategoryAssignment};
pub use manager::{AddOutcome, RegenerateScope, VocabularyError, VocabularyManager, VocabularyResult};
pub use store::{StoreError, StoreResult, VocabularyHistoryInsert, VocabularyPatch, VocabularyRow, VocabularyStore};
