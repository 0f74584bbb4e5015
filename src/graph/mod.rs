//! Core graph data structures: the property-graph model underlying the
//! concept graph, the vocabulary graph, and provenance metadata (§3).

mod edge;
mod engine;
mod entities;
mod node;
mod ontology;


pub use edge::{Edge, EdgeId, EdgeProvenance, EdgeSource};
pub use engine::{GraphEngine, GraphEngineError, GraphEngineResult};
pub use entities::{
    Concept, DirectionSemantics, DocumentMeta, DocumentSourceType, EpistemicStatus, Instance,
    SourceContentType, SourceRecord, VocabCategory, VocabType, APPEARS, EVIDENCED_BY, FROM_SOURCE,
    HAS_SOURCE, IN_CATEGORY, SIMILAR_TO, SYSTEM_TYPE_BLACKLIST,
};
pub use node::{Namespace, Node, NodeId, NodeLabel, PropertyValue};
pub use ontology::{Ontology, OntologyId, OntologyMetadata};

/// The reserved ontology name holding the global vocabulary graph
/// (VocabType + VocabCategory nodes, IN_CATEGORY + SIMILAR_TO edges).
///
/// Mirrors the teacher's convention of a well-known singleton context name
/// (e.g. `__provenance__`) for graph-wide bookkeeping that doesn't belong
/// to any single ingested ontology.
pub const VOCABULARY_ONTOLOGY: &str = "__vocabulary__";
