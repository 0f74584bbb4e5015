//! Typed accessors over the generic `Node` for each of the six entities
//! named in §3.1: `Concept`, `Source` (`SourceRecord` here to avoid clashing
//! with the teacher's object-storage `Source` concept), `Instance`,
//! `DocumentMeta`, `VocabType`, `VocabCategory`.
//!
//! Each wraps a builder/reader pair: construct with `::new(...)`, convert
//! `into_node()` for persistence, and recover with `::from_node(&node)` when
//! reading back from the store. Properties not modeled by a dedicated field
//! still round-trip through the underlying `Node::properties` bag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId, NodeLabel, PropertyValue};

fn get_string(node: &Node, key: &str) -> Option<String> {
    node.get_str(key).map(|s| s.to_string())
}

fn get_string_vec(node: &Node, key: &str) -> Vec<String> {
    node.get(key)
        .and_then(PropertyValue::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// A deduplicated meaning unit (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: NodeId,
    pub label: String,
    pub description: String,
    pub embedding: Vec<f32>,
    pub search_terms: Vec<String>,
    /// In `[-1, 1]`; absent until the grounding engine (L8) has run.
    pub grounding_strength: Option<f32>,
}

impl Concept {
    pub fn new(label: impl Into<String>, description: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            concept_id: NodeId::new(),
            label: label.into(),
            description: description.into(),
            embedding,
            search_terms: Vec::new(),
            grounding_strength: None,
        }
    }

    pub fn with_search_terms(mut self, terms: Vec<String>) -> Self {
        self.search_terms = terms;
        self
    }

    pub fn into_node(self) -> Node {
        Node::new(NodeLabel::Concept)
            .with_id(self.concept_id)
            .with_property("label", self.label)
            .with_property("description", self.description)
            .with_property("embedding", self.embedding)
            .with_property("search_terms", self.search_terms)
            .with_property("grounding_strength", self.grounding_strength)
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.label != NodeLabel::Concept {
            return None;
        }
        Some(Self {
            concept_id: node.id.clone(),
            label: get_string(node, "label")?,
            description: get_string(node, "description").unwrap_or_default(),
            embedding: node.get("embedding").and_then(PropertyValue::as_f32_vec).unwrap_or_default(),
            search_terms: get_string_vec(node, "search_terms"),
            grounding_strength: node.get("grounding_strength").and_then(PropertyValue::as_f64).map(|v| v as f32),
        })
    }
}

/// `content_type` discriminator for a `SourceRecord` (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceContentType {
    Document,
    Image,
}

impl SourceContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceContentType::Document => "document",
            SourceContentType::Image => "image",
        }
    }
}

impl std::str::FromStr for SourceContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(SourceContentType::Document),
            "image" => Ok(SourceContentType::Image),
            other => Err(format!("unknown source content type: {other}")),
        }
    }
}

/// One retrievable chunk of evidence (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: NodeId,
    /// Logical ontology name this source belongs to.
    pub document: String,
    pub paragraph: i64,
    pub full_text: String,
    pub content_type: SourceContentType,
    /// Image blob key in the object store.
    pub storage_key: Option<String>,
    /// Original document blob key in the object store.
    pub garage_key: Option<String>,
    pub content_hash: Option<String>,
    pub char_offset_start: Option<i64>,
    pub char_offset_end: Option<i64>,
    pub chunk_index: Option<i64>,
    pub visual_embedding: Option<Vec<f32>>,
    pub embedding: Option<Vec<f32>>,
}

impl SourceRecord {
    pub fn new(document: impl Into<String>, paragraph: i64, full_text: impl Into<String>) -> Self {
        Self {
            source_id: NodeId::new(),
            document: document.into(),
            paragraph,
            full_text: full_text.into(),
            content_type: SourceContentType::Document,
            storage_key: None,
            garage_key: None,
            content_hash: None,
            char_offset_start: None,
            char_offset_end: None,
            chunk_index: None,
            visual_embedding: None,
            embedding: None,
        }
    }

    pub fn into_node(self) -> Node {
        Node::new(NodeLabel::Source)
            .with_id(self.source_id)
            .with_property("document", self.document)
            .with_property("paragraph", self.paragraph)
            .with_property("full_text", self.full_text)
            .with_property("content_type", self.content_type.as_str())
            .with_property("storage_key", self.storage_key)
            .with_property("garage_key", self.garage_key)
            .with_property("content_hash", self.content_hash)
            .with_property("char_offset_start", self.char_offset_start)
            .with_property("char_offset_end", self.char_offset_end)
            .with_property("chunk_index", self.chunk_index)
            .with_property("visual_embedding", self.visual_embedding)
            .with_property("embedding", self.embedding)
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.label != NodeLabel::Source {
            return None;
        }
        Some(Self {
            source_id: node.id.clone(),
            document: get_string(node, "document")?,
            paragraph: node.get("paragraph").and_then(PropertyValue::as_i64).unwrap_or(0),
            full_text: get_string(node, "full_text").unwrap_or_default(),
            content_type: get_string(node, "content_type")
                .and_then(|s| s.parse().ok())
                .unwrap_or(SourceContentType::Document),
            storage_key: get_string(node, "storage_key"),
            garage_key: get_string(node, "garage_key"),
            content_hash: get_string(node, "content_hash"),
            char_offset_start: node.get("char_offset_start").and_then(PropertyValue::as_i64),
            char_offset_end: node.get("char_offset_end").and_then(PropertyValue::as_i64),
            chunk_index: node.get("chunk_index").and_then(PropertyValue::as_i64),
            visual_embedding: node.get("visual_embedding").and_then(PropertyValue::as_f32_vec),
            embedding: node.get("embedding").and_then(PropertyValue::as_f32_vec),
        })
    }
}

/// A verbatim quote linking a Concept to a Source (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: NodeId,
    pub quote: String,
}

impl Instance {
    pub fn new(quote: impl Into<String>) -> Self {
        Self {
            instance_id: NodeId::new(),
            quote: quote.into(),
        }
    }

    pub fn into_node(self) -> Node {
        Node::new(NodeLabel::Instance)
            .with_id(self.instance_id)
            .with_property("quote", self.quote)
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.label != NodeLabel::Instance {
            return None;
        }
        Some(Self {
            instance_id: node.id.clone(),
            quote: get_string(node, "quote").unwrap_or_default(),
        })
    }
}

/// How a document entered the system (`DocumentMeta.source_type`, §3.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSourceType {
    File,
    Stdin,
    Mcp,
    Api,
    Url,
}

impl DocumentSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSourceType::File => "file",
            DocumentSourceType::Stdin => "stdin",
            DocumentSourceType::Mcp => "mcp",
            DocumentSourceType::Api => "api",
            DocumentSourceType::Url => "url",
        }
    }
}

impl std::str::FromStr for DocumentSourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(DocumentSourceType::File),
            "stdin" => Ok(DocumentSourceType::Stdin),
            "mcp" => Ok(DocumentSourceType::Mcp),
            "api" => Ok(DocumentSourceType::Api),
            "url" => Ok(DocumentSourceType::Url),
            other => Err(format!("unknown document source type: {other}")),
        }
    }
}

/// Provenance record per ingested document (§3.1). `document_id` is always
/// equal to `content_hash` — see the dedup key in §3.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub document_id: String,
    pub content_hash: String,
    pub ontology: String,
    pub source_count: i64,
    pub ingested_by: String,
    pub job_id: String,
    pub filename: Option<String>,
    pub source_type: DocumentSourceType,
    pub file_path: Option<String>,
    pub hostname: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub garage_key: Option<String>,
}

impl DocumentMeta {
    pub fn new(
        content_hash: impl Into<String>,
        ontology: impl Into<String>,
        ingested_by: impl Into<String>,
        job_id: impl Into<String>,
        source_type: DocumentSourceType,
    ) -> Self {
        let content_hash = content_hash.into();
        Self {
            document_id: content_hash.clone(),
            content_hash,
            ontology: ontology.into(),
            source_count: 0,
            ingested_by: ingested_by.into(),
            job_id: job_id.into(),
            filename: None,
            source_type,
            file_path: None,
            hostname: None,
            ingested_at: Utc::now(),
            garage_key: None,
        }
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::from_string(self.document_id.clone())
    }

    pub fn into_node(self) -> Node {
        Node::new(NodeLabel::DocumentMeta)
            .with_id(NodeId::from_string(self.document_id))
            .with_property("content_hash", self.content_hash)
            .with_property("ontology", self.ontology)
            .with_property("source_count", self.source_count)
            .with_property("ingested_by", self.ingested_by)
            .with_property("job_id", self.job_id)
            .with_property("filename", self.filename)
            .with_property("source_type", self.source_type.as_str())
            .with_property("file_path", self.file_path)
            .with_property("hostname", self.hostname)
            .with_property("ingested_at", self.ingested_at.to_rfc3339())
            .with_property("garage_key", self.garage_key)
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.label != NodeLabel::DocumentMeta {
            return None;
        }
        Some(Self {
            document_id: node.id.as_str().to_string(),
            content_hash: get_string(node, "content_hash")?,
            ontology: get_string(node, "ontology")?,
            source_count: node.get("source_count").and_then(PropertyValue::as_i64).unwrap_or(0),
            ingested_by: get_string(node, "ingested_by").unwrap_or_default(),
            job_id: get_string(node, "job_id").unwrap_or_default(),
            filename: get_string(node, "filename"),
            source_type: get_string(node, "source_type")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DocumentSourceType::Api),
            file_path: get_string(node, "file_path"),
            hostname: get_string(node, "hostname"),
            ingested_at: get_string(node, "ingested_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            garage_key: get_string(node, "garage_key"),
        })
    }
}

/// Whether a typed relationship is directionally meaningful (§3.3 invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionSemantics {
    Outward,
    Inward,
    Bidirectional,
}

impl DirectionSemantics {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectionSemantics::Outward => "outward",
            DirectionSemantics::Inward => "inward",
            DirectionSemantics::Bidirectional => "bidirectional",
        }
    }
}

impl std::str::FromStr for DirectionSemantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outward" => Ok(DirectionSemantics::Outward),
            "inward" => Ok(DirectionSemantics::Inward),
            "bidirectional" => Ok(DirectionSemantics::Bidirectional),
            other => Err(format!("unknown direction semantics: {other}")),
        }
    }
}

/// Confidence classification produced by the epistemic engine (L9, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpistemicStatus {
    Affirmative,
    Contested,
    Emerging,
    Contradictory,
    Historical,
    InsufficientData,
    Unclassified,
}

impl EpistemicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpistemicStatus::Affirmative => "AFFIRMATIVE",
            EpistemicStatus::Contested => "CONTESTED",
            EpistemicStatus::Emerging => "EMERGING",
            EpistemicStatus::Contradictory => "CONTRADICTORY",
            EpistemicStatus::Historical => "HISTORICAL",
            EpistemicStatus::InsufficientData => "INSUFFICIENT_DATA",
            EpistemicStatus::Unclassified => "UNCLASSIFIED",
        }
    }
}

impl std::str::FromStr for EpistemicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AFFIRMATIVE" => Ok(EpistemicStatus::Affirmative),
            "CONTESTED" => Ok(EpistemicStatus::Contested),
            "EMERGING" => Ok(EpistemicStatus::Emerging),
            "CONTRADICTORY" => Ok(EpistemicStatus::Contradictory),
            "HISTORICAL" => Ok(EpistemicStatus::Historical),
            "INSUFFICIENT_DATA" => Ok(EpistemicStatus::InsufficientData),
            "UNCLASSIFIED" => Ok(EpistemicStatus::Unclassified),
            other => Err(format!("unknown epistemic status: {other}")),
        }
    }
}

/// A relationship type (§3.1). The graph node; `relationship_vocabulary`'s
/// relational row (embedding, category scoring, synonyms, ...) is modeled
/// separately in `vocabulary::store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabType {
    pub name: String,
    pub is_active: bool,
    pub is_builtin: bool,
    pub usage_count: i64,
    pub direction_semantics: Option<DirectionSemantics>,
    pub epistemic_status: EpistemicStatus,
    pub epistemic_rationale: Option<String>,
    pub epistemic_measured_at: Option<DateTime<Utc>>,
}

impl VocabType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_active: true,
            is_builtin: false,
            usage_count: 0,
            direction_semantics: None,
            epistemic_status: EpistemicStatus::Unclassified,
            epistemic_rationale: None,
            epistemic_measured_at: None,
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        let mut v = Self::new(name);
        v.is_builtin = true;
        v
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::from_string(self.name.clone())
    }

    pub fn into_node(self) -> Node {
        Node::new(NodeLabel::VocabType)
            .with_id(NodeId::from_string(self.name.clone()))
            .with_property("name", self.name)
            .with_property("is_active", self.is_active)
            .with_property("is_builtin", self.is_builtin)
            .with_property("usage_count", self.usage_count)
            .with_property("direction_semantics", self.direction_semantics.map(|d| d.as_str().to_string()))
            .with_property("epistemic_status", self.epistemic_status.as_str())
            .with_property("epistemic_rationale", self.epistemic_rationale)
            .with_property(
                "epistemic_measured_at",
                self.epistemic_measured_at.map(|dt| dt.to_rfc3339()),
            )
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.label != NodeLabel::VocabType {
            return None;
        }
        Some(Self {
            name: get_string(node, "name")?,
            is_active: node.get("is_active").and_then(PropertyValue::as_bool).unwrap_or(true),
            is_builtin: node.get("is_builtin").and_then(PropertyValue::as_bool).unwrap_or(false),
            usage_count: node.get("usage_count").and_then(PropertyValue::as_i64).unwrap_or(0),
            direction_semantics: get_string(node, "direction_semantics").and_then(|s| s.parse().ok()),
            epistemic_status: get_string(node, "epistemic_status")
                .and_then(|s| s.parse().ok())
                .unwrap_or(EpistemicStatus::Unclassified),
            epistemic_rationale: get_string(node, "epistemic_rationale"),
            epistemic_measured_at: get_string(node, "epistemic_measured_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

/// A semantic bucket for VocabTypes (§3.1), e.g. `causation`, `structural`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabCategory {
    pub name: String,
}

impl VocabCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::from_string(self.name.clone())
    }

    pub fn into_node(self) -> Node {
        Node::new(NodeLabel::VocabCategory)
            .with_id(NodeId::from_string(self.name.clone()))
            .with_property("name", self.name)
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        if node.label != NodeLabel::VocabCategory {
            return None;
        }
        Some(Self {
            name: get_string(node, "name")?,
        })
    }
}

/// Relationship-type names every concept-to-concept typed edge carries
/// (§3.2): `Edge::structural` is for the fixed structural types below;
/// dynamic concept-to-concept edges carry full `EdgeProvenance`.
pub const APPEARS: &str = "APPEARS";
pub const EVIDENCED_BY: &str = "EVIDENCED_BY";
pub const FROM_SOURCE: &str = "FROM_SOURCE";
pub const HAS_SOURCE: &str = "HAS_SOURCE";
pub const IN_CATEGORY: &str = "IN_CATEGORY";
pub const SIMILAR_TO: &str = "SIMILAR_TO";

/// Relationship-type names that `vocabulary::manager::sync_from_graph` must
/// never register as a new VocabType (§4.5 step 4).
pub const SYSTEM_TYPE_BLACKLIST: &[&str] =
    &["APPEARS_IN", "EVIDENCED_BY", "FROM_SOURCE", "IN_CATEGORY", "LOAD", "SET", "APPEARS"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concept_round_trips_through_node() {
        let concept = Concept::new("travel", "the act of going somewhere", vec![0.1, 0.2, 0.3])
            .with_search_terms(vec!["travel".into(), "journey".into()]);
        let id = concept.concept_id.clone();
        let node = concept.into_node();
        let back = Concept::from_node(&node).unwrap();
        assert_eq!(back.concept_id, id);
        assert_eq!(back.label, "travel");
        assert_eq!(back.embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(back.search_terms, vec!["travel", "journey"]);
    }

    #[test]
    fn document_meta_id_equals_content_hash() {
        let doc = DocumentMeta::new("abc123", "my-ontology", "user-1", "job-1", DocumentSourceType::File);
        assert_eq!(doc.document_id, "abc123");
        let node = doc.into_node();
        assert_eq!(node.id.as_str(), "abc123");
    }

    #[test]
    fn vocab_type_node_id_is_its_name() {
        let vt = VocabType::builtin("CAUSES");
        assert_eq!(vt.node_id().as_str(), "CAUSES");
        let node = vt.into_node();
        let back = VocabType::from_node(&node).unwrap();
        assert!(back.is_builtin);
        assert_eq!(back.name, "CAUSES");
    }

    #[test]
    fn system_type_blacklist_excludes_structural_relationships() {
        assert!(SYSTEM_TYPE_BLACKLIST.contains(&APPEARS));
        assert!(SYSTEM_TYPE_BLACKLIST.contains(&IN_CATEGORY));
        assert!(!SYSTEM_TYPE_BLACKLIST.contains(&"CAUSES"));
    }
}
