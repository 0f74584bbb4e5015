//! Generic node representation backing every typed entity in §3.1.
//!
//! Mirrors the teacher's `Node`: an identifier plus a label discriminator
//! and an untyped property bag. Typed entities (`Concept`, `SourceRecord`,
//! `Instance`, `DocumentMeta`, `VocabType`, `VocabCategory`, see
//! `graph::entities`) are built and read through this carrier so the
//! storage layer only ever persists one shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a node.
///
/// Serializes as a plain string: a UUID for auto-generated entities, or a
/// semantic id (a content-hash-derived chunk id, a VocabType's UPPER_SNAKE
/// name, ...) for entities whose identity is derived from their content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The disjoint graph namespaces the query facade (L2) refuses to conflate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// `Concept`, `Source`, `Instance`, `DocumentMeta` — partitioned per ontology.
    ConceptGraph,
    /// `VocabType`, `VocabCategory` — graph-wide, lives in `VOCABULARY_ONTOLOGY`.
    VocabularyGraph,
}

/// Node label — the explicit type every facade query must name (§3.1, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeLabel {
    Concept,
    Source,
    Instance,
    DocumentMeta,
    VocabType,
    VocabCategory,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Concept => "Concept",
            NodeLabel::Source => "Source",
            NodeLabel::Instance => "Instance",
            NodeLabel::DocumentMeta => "DocumentMeta",
            NodeLabel::VocabType => "VocabType",
            NodeLabel::VocabCategory => "VocabCategory",
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            NodeLabel::Concept | NodeLabel::Source | NodeLabel::Instance | NodeLabel::DocumentMeta => {
                Namespace::ConceptGraph
            }
            NodeLabel::VocabType | NodeLabel::VocabCategory => Namespace::VocabularyGraph,
        }
    }
}

impl std::str::FromStr for NodeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Concept" => Ok(NodeLabel::Concept),
            "Source" => Ok(NodeLabel::Source),
            "Instance" => Ok(NodeLabel::Instance),
            "DocumentMeta" => Ok(NodeLabel::DocumentMeta),
            "VocabType" => Ok(NodeLabel::VocabType),
            "VocabCategory" => Ok(NodeLabel::VocabCategory),
            other => Err(format!("unknown node label: {other}")),
        }
    }
}

/// Typed property values: the scalar/array/map shapes a node's property bag
/// can hold once the declarative query layer's vertex/edge annotations are
/// stripped (see `store::cypher`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
    Object(HashMap<String, PropertyValue>),
    Null,
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Decode an embedding vector stored as `Array(Float...)`.
    pub fn as_f32_vec(&self) -> Option<Vec<f32>> {
        self.as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_f64())
                .map(|v| v as f32)
                .collect()
        })
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<usize> for PropertyValue {
    fn from(v: usize) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<Vec<f32>> for PropertyValue {
    fn from(v: Vec<f32>) -> Self {
        PropertyValue::Array(v.into_iter().map(PropertyValue::from).collect())
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::Array(v.into_iter().map(PropertyValue::String).collect())
    }
}

impl<T> From<Option<T>> for PropertyValue
where
    PropertyValue: From<T>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => PropertyValue::from(v),
            None => PropertyValue::Null,
        }
    }
}

/// Properties collection backing a node or edge.
pub type Properties = HashMap<String, PropertyValue>;

/// A node in the property graph: an id, a label, and a property bag.
///
/// Entity-specific fields (`Concept::label`, `SourceRecord::content_hash`,
/// ...) live in `properties`, accessed through the typed wrappers in
/// `graph::entities` rather than directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub label: NodeLabel,
    pub properties: Properties,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Node {
    pub fn new(label: NodeLabel) -> Self {
        Self {
            id: NodeId::new(),
            label,
            properties: HashMap::new(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    pub fn namespace(&self) -> Namespace {
        self.label.namespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_label_namespace_partitions_correctly() {
        assert_eq!(NodeLabel::Concept.namespace(), Namespace::ConceptGraph);
        assert_eq!(NodeLabel::VocabType.namespace(), Namespace::VocabularyGraph);
        assert_eq!(NodeLabel::VocabCategory.namespace(), Namespace::VocabularyGraph);
    }

    #[test]
    fn property_value_round_trips_through_json() {
        let v = PropertyValue::Array(vec![PropertyValue::Float(0.1), PropertyValue::Float(0.2)]);
        let json = serde_json::to_string(&v).unwrap();
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn node_builder_sets_properties() {
        let node = Node::new(NodeLabel::Concept)
            .with_property("label", "travel")
            .with_property("grounding_strength", 0.75f64);
        assert_eq!(node.get_str("label"), Some("travel"));
        assert_eq!(node.get("grounding_strength").and_then(|v| v.as_f64()), Some(0.75));
    }
}
