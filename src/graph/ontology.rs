//! Ontology: a bounded partition of the concept graph (§3, §4.2).
//!
//! Each ingested body of knowledge lives in its own ontology: its own
//! Concepts, Sources, Instances, and DocumentMetas. The reserved
//! [`crate::graph::VOCABULARY_ONTOLOGY`] ontology holds the one graph-wide
//! VocabType/VocabCategory graph instead.

use super::edge::Edge;
use super::node::{Node, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for an ontology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OntologyId(String);

impl OntologyId {
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

impl Default for OntologyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OntologyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OntologyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OntologyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Metadata about an ontology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// A bounded partition of the graph: one ontology's nodes and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ontology {
    pub id: OntologyId,
    pub name: String,
    pub description: Option<String>,
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    pub metadata: OntologyMetadata,
}

impl Ontology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OntologyId::new(),
            name: name.into(),
            description: None,
            nodes: HashMap::new(),
            edges: Vec::new(),
            metadata: OntologyMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    pub fn with_id(id: OntologyId, name: impl Into<String>) -> Self {
        let mut ontology = Self::new(name);
        ontology.id = id;
        ontology
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.touch();
        id
    }

    /// Append an edge. Edges are never mutated in place (§3.2): a merge is
    /// expressed by the caller deleting the old edge and adding a fresh one
    /// with the copied-forward properties, not by updating this one.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
        self.touch();
    }

    /// Delete an edge by id. Used by the merge/retraction path in §3.3.
    pub fn remove_edge(&mut self, edge_id: &super::EdgeId) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| &e.id == edge_id)?;
        self.touch();
        Some(self.edges.remove(idx))
    }

    pub fn remove_node(&mut self, node_id: &NodeId) -> Option<Node> {
        let removed = self.nodes.remove(node_id);
        if removed.is_some() {
            self.edges.retain(|e| &e.source != node_id && &e.target != node_id);
            self.touch();
        }
        removed
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edges_from(&self, node_id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.source == node_id)
    }

    pub fn edges_to(&self, node_id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.target == node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::EdgeProvenance;
    use crate::graph::entities::{Concept, EVIDENCED_BY};
    use crate::graph::node::NodeLabel;

    fn concept_node(label: &str) -> Node {
        Concept::new(label, "a test concept", vec![0.1, 0.2]).into_node()
    }

    #[test]
    fn add_node_then_get_node_round_trips() {
        let mut ontology = Ontology::new("test-ontology");
        let node = concept_node("travel");
        let id = ontology.add_node(node);
        assert!(ontology.get_node(&id).is_some());
        assert_eq!(ontology.node_count(), 1);
    }

    #[test]
    fn add_edge_never_merges_duplicates() {
        let mut ontology = Ontology::new("test-ontology");
        let a = ontology.add_node(concept_node("travel"));
        let b = ontology.add_node(concept_node("journey"));

        let edge1 = Edge::new(
            a.clone(),
            b.clone(),
            "CAUSES",
            EdgeProvenance::new("causation", crate::graph::edge::EdgeSource::LlmExtraction),
        );
        let edge2 = Edge::new(
            a.clone(),
            b.clone(),
            "CAUSES",
            EdgeProvenance::new("causation", crate::graph::edge::EdgeSource::LlmExtraction),
        );
        ontology.add_edge(edge1);
        ontology.add_edge(edge2);

        // Both persist: merging duplicates is the caller's responsibility
        // (delete old, insert new with copied-forward properties), never
        // an implicit in-place update.
        assert_eq!(ontology.edge_count(), 2);
    }

    #[test]
    fn remove_node_prunes_incident_edges() {
        let mut ontology = Ontology::new("test-ontology");
        let a = ontology.add_node(concept_node("travel"));
        let b = ontology.add_node(Node::new(NodeLabel::Instance).with_property("quote", "a quote"));
        ontology.add_edge(Edge::structural(a.clone(), b.clone(), EVIDENCED_BY));
        assert_eq!(ontology.edge_count(), 1);

        ontology.remove_node(&a);
        assert_eq!(ontology.edge_count(), 0, "edges incident to a removed node are pruned");
        assert_eq!(ontology.node_count(), 1);
    }

    #[test]
    fn remove_edge_deletes_exactly_one() {
        let mut ontology = Ontology::new("test-ontology");
        let a = ontology.add_node(concept_node("travel"));
        let b = ontology.add_node(concept_node("journey"));
        let edge = Edge::new(
            a,
            b,
            "CAUSES",
            EdgeProvenance::new("causation", crate::graph::edge::EdgeSource::LlmExtraction),
        );
        let edge_id = edge.id.clone();
        ontology.add_edge(edge);

        let removed = ontology.remove_edge(&edge_id);
        assert!(removed.is_some());
        assert_eq!(ontology.edge_count(), 0);
    }
}
