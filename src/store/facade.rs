//! Namespace-qualified accessors (§4.2) layered over `GraphEngine`.

use super::audit::AuditLog;
use super::query;
use crate::graph::{
    Edge, EpistemicStatus, GraphEngine, GraphEngineError, Node, NodeLabel, OntologyId, VocabType,
    VOCABULARY_ONTOLOGY,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QueryFacadeError {
    #[error(transparent)]
    Engine(#[from] GraphEngineError),
}

pub type QueryFacadeResult<T> = Result<T, QueryFacadeError>;

#[derive(Debug, Clone, Default)]
pub struct NamespaceCounts {
    pub concepts: usize,
    pub sources: usize,
    pub instances: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VocabularyCounts {
    pub types: usize,
    pub categories: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub concept_graph: NamespaceCounts,
    pub vocabulary_graph: VocabularyCounts,
    pub total_nodes: usize,
}

/// A namespace-safe wrapper over the graph store client (L1). Every safe
/// method below hard-codes the `NodeLabel` it reads; `execute_raw` is the
/// only way to query without that constraint, and every call through it is
/// logged and counted against the namespace's raw-query budget (§4.2).
pub struct QueryFacade {
    engine: Arc<GraphEngine>,
    audit: AuditLog,
}

impl QueryFacade {
    pub fn new(engine: Arc<GraphEngine>) -> Self {
        Self { engine, audit: AuditLog::new() }
    }

    pub fn audit(&self) -> super::audit::AuditSnapshot {
        self.audit.snapshot()
    }

    fn nodes_with_label(
        &self,
        ontology_id: &OntologyId,
        label: NodeLabel,
        predicate: impl Fn(&Node) -> bool,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Node>> {
        let query = query::build_match_query("n", label.as_str(), &[], "n", limit);
        let ontology = self.engine.get_ontology(ontology_id).ok_or_else(|| {
            GraphEngineError::Other(format!("ontology not loaded: {ontology_id}"))
        })?;
        let mut matches: Vec<Node> = ontology
            .nodes()
            .filter(|n| n.label == label && predicate(n))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        self.audit.record_safe_query(&query);
        Ok(matches)
    }

    pub fn match_concepts(
        &self,
        ontology_id: &OntologyId,
        predicate: impl Fn(&Node) -> bool,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Node>> {
        self.nodes_with_label(ontology_id, NodeLabel::Concept, predicate, limit)
    }

    pub fn count_concepts(
        &self,
        ontology_id: &OntologyId,
        predicate: impl Fn(&Node) -> bool,
    ) -> QueryFacadeResult<usize> {
        Ok(self.match_concepts(ontology_id, predicate, None)?.len())
    }

    pub fn match_sources(
        &self,
        ontology_id: &OntologyId,
        predicate: impl Fn(&Node) -> bool,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Node>> {
        self.nodes_with_label(ontology_id, NodeLabel::Source, predicate, limit)
    }

    pub fn match_instances(
        &self,
        ontology_id: &OntologyId,
        predicate: impl Fn(&Node) -> bool,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Node>> {
        self.nodes_with_label(ontology_id, NodeLabel::Instance, predicate, limit)
    }

    fn vocabulary_ontology_id(&self) -> OntologyId {
        self.engine.ontology_id_for_name(VOCABULARY_ONTOLOGY)
    }

    pub fn match_vocab_types(
        &self,
        predicate: impl Fn(&Node) -> bool,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Node>> {
        let vocab_id = self.vocabulary_ontology_id();
        self.nodes_with_label(&vocab_id, NodeLabel::VocabType, predicate, limit)
    }

    pub fn count_vocab_types(&self, predicate: impl Fn(&Node) -> bool) -> QueryFacadeResult<usize> {
        Ok(self.match_vocab_types(predicate, None)?.len())
    }

    pub fn match_vocab_categories(&self, predicate: impl Fn(&Node) -> bool) -> QueryFacadeResult<Vec<Node>> {
        let vocab_id = self.vocabulary_ontology_id();
        self.nodes_with_label(&vocab_id, NodeLabel::VocabCategory, predicate, None)
    }

    /// Candidate synonym pairs: `SIMILAR_TO` edges between VocabType nodes
    /// with `similarity >= min_similarity`, optionally restricted to a
    /// category (via each endpoint's `IN_CATEGORY` edge target).
    pub fn find_vocabulary_synonyms(
        &self,
        min_similarity: f32,
        category: Option<&str>,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Edge>> {
        let query = query::build_match_query(
            "a",
            NodeLabel::VocabType.as_str(),
            &[],
            "a, r, b",
            limit,
        );
        let vocab_id = self.vocabulary_ontology_id();
        let ontology = self.engine.get_ontology(&vocab_id).ok_or_else(|| {
            GraphEngineError::Other(format!("ontology not loaded: {vocab_id}"))
        })?;

        let mut matches: Vec<Edge> = ontology
            .edges()
            .filter(|e| e.relationship == crate::graph::SIMILAR_TO)
            .filter(|e| {
                e.properties
                    .get("similarity")
                    .and_then(|v| v.as_f64())
                    .map(|sim| sim as f32 >= min_similarity)
                    .unwrap_or(false)
            })
            .filter(|e| match category {
                None => true,
                Some(cat) => {
                    node_category(&ontology, &e.source) == Some(cat.to_string())
                        && node_category(&ontology, &e.target) == Some(cat.to_string())
                }
            })
            .cloned()
            .collect();

        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        self.audit.record_safe_query(&query);
        Ok(matches)
    }

    /// `include_epistemic_status`/`exclude_epistemic_status`: first resolve
    /// matching VocabType names from the vocabulary graph, intersect with
    /// any caller-supplied `rel_types`, then filter concept-graph edges by
    /// the resulting explicit type list (§4.2).
    pub fn match_concept_relationships(
        &self,
        ontology_id: &OntologyId,
        rel_types: Option<&[String]>,
        include_epistemic_status: Option<&[EpistemicStatus]>,
        exclude_epistemic_status: Option<&[EpistemicStatus]>,
        limit: Option<usize>,
    ) -> QueryFacadeResult<Vec<Edge>> {
        let query = query::build_match_query("a", NodeLabel::Concept.as_str(), &[], "a, r, b", limit);
        let vocab_id = self.vocabulary_ontology_id();
        let vocab_ontology = self.engine.get_ontology(&vocab_id);

        let mut allowed_types: Option<Vec<String>> = rel_types.map(|t| t.to_vec());

        if include_epistemic_status.is_some() || exclude_epistemic_status.is_some() {
            let names: Vec<String> = vocab_ontology
                .as_ref()
                .map(|o| {
                    o.nodes()
                        .filter(|n| n.label == NodeLabel::VocabType)
                        .filter_map(VocabType::from_node)
                        .filter(|vt| {
                            include_epistemic_status
                                .map(|incl| incl.contains(&vt.epistemic_status))
                                .unwrap_or(true)
                        })
                        .filter(|vt| {
                            exclude_epistemic_status
                                .map(|excl| !excl.contains(&vt.epistemic_status))
                                .unwrap_or(true)
                        })
                        .map(|vt| vt.name)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            allowed_types = Some(match allowed_types {
                Some(existing) => existing.into_iter().filter(|t| names.contains(t)).collect(),
                None => names,
            });
        }

        let ontology = self.engine.get_ontology(ontology_id).ok_or_else(|| {
            GraphEngineError::Other(format!("ontology not loaded: {ontology_id}"))
        })?;

        let mut matches: Vec<Edge> = ontology
            .edges()
            .filter(|e| match &allowed_types {
                Some(types) => types.contains(&e.relationship),
                None => true,
            })
            .cloned()
            .collect();

        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        self.audit.record_safe_query(&query);
        Ok(matches)
    }

    pub fn get_graph_stats(&self, ontology_id: &OntologyId) -> QueryFacadeResult<GraphStats> {
        let query = "MATCH (n) WHERE n:Concept OR n:Source OR n:Instance OR n:VocabType OR n:VocabCategory \
             RETURN labels(n) AS label, count(n) AS count"
            .to_string();
        let ontology = self.engine.get_ontology(ontology_id).ok_or_else(|| {
            GraphEngineError::Other(format!("ontology not loaded: {ontology_id}"))
        })?;
        let concept_graph = NamespaceCounts {
            concepts: ontology.nodes().filter(|n| n.label == NodeLabel::Concept).count(),
            sources: ontology.nodes().filter(|n| n.label == NodeLabel::Source).count(),
            instances: ontology.nodes().filter(|n| n.label == NodeLabel::Instance).count(),
        };

        let vocab_id = self.vocabulary_ontology_id();
        let vocabulary_graph = match self.engine.get_ontology(&vocab_id) {
            Some(vocab) => VocabularyCounts {
                types: vocab.nodes().filter(|n| n.label == NodeLabel::VocabType).count(),
                categories: vocab.nodes().filter(|n| n.label == NodeLabel::VocabCategory).count(),
            },
            None => VocabularyCounts::default(),
        };

        let total_nodes = concept_graph.concepts
            + concept_graph.sources
            + concept_graph.instances
            + vocabulary_graph.types
            + vocabulary_graph.categories;

        self.audit.record_safe_query(&query);
        Ok(GraphStats { concept_graph, vocabulary_graph, total_nodes })
    }

    /// The escape hatch (§4.2): no label is enforced, so any namespace may
    /// be queried. Every call is logged at WARN and counted against the
    /// raw-query budget.
    pub fn execute_raw(
        &self,
        ontology_id: &OntologyId,
        label: Option<NodeLabel>,
        predicate: impl Fn(&Node) -> bool,
    ) -> QueryFacadeResult<Vec<Node>> {
        let query = query::build_match_query(
            "n",
            label.map(|l| l.as_str()).unwrap_or("*"),
            &[],
            "n",
            None,
        );
        warn!(ontology_id = %ontology_id, label = ?label, query = %query, "raw facade query executed, bypassing namespace safety");
        let ontology = self.engine.get_ontology(ontology_id).ok_or_else(|| {
            GraphEngineError::Other(format!("ontology not loaded: {ontology_id}"))
        })?;
        let matches: Vec<Node> = ontology
            .nodes()
            .filter(|n| label.map(|l| n.label == l).unwrap_or(true))
            .filter(|n| predicate(n))
            .cloned()
            .collect();
        self.audit.record_raw_query(&query);
        Ok(matches)
    }

    /// The L1 primitive named by §4.1: substitutes escaped params into
    /// `query`, computes the RETURN-clause column spec, and shapes each
    /// matched node's properties into a row keyed by that spec. The WHERE
    /// condition is supplied as a Rust predicate (see the module doc) rather
    /// than parsed out of `query`; `query` still drives label dispatch,
    /// parameter substitution, and column naming, so every call is traceable
    /// end-to-end through the same text a caller would read in a log line.
    pub fn execute(
        &self,
        ontology_id: &OntologyId,
        query_text: &str,
        params: &HashMap<String, serde_json::Value>,
        label: NodeLabel,
        predicate: impl Fn(&Node) -> bool,
        fetch_one: bool,
    ) -> QueryFacadeResult<Vec<serde_json::Value>> {
        let substituted = query::substitute_params(query_text, params);
        let columns = query::compute_column_spec(&substituted);

        let mut nodes = self.nodes_with_label(ontology_id, label, predicate, if fetch_one { Some(1) } else { None })?;
        if fetch_one {
            nodes.truncate(1);
        }

        Ok(nodes
            .into_iter()
            .map(|n| {
                let serialized = serde_json::to_string(&n).unwrap_or_default();
                let parsed = query::parse_return_value(&format!("{serialized}::vertex"));
                if columns.len() == 1 {
                    parsed
                } else {
                    serde_json::json!({ columns[0].clone(): parsed })
                }
            })
            .collect())
    }
}

fn node_category(ontology: &crate::graph::Ontology, node_id: &crate::graph::NodeId) -> Option<String> {
    ontology
        .edges_from(node_id)
        .find(|e| e.relationship == crate::graph::IN_CATEGORY)
        .and_then(|e| ontology.get_node(&e.target))
        .and_then(|n| n.get_str("name").map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Concept, Edge, VocabCategory, IN_CATEGORY};

    fn facade_with_concepts() -> (QueryFacade, OntologyId) {
        let engine = Arc::new(GraphEngine::new());
        let ontology_id = engine.ontology_id_for_name("acme");
        engine.add_node(&ontology_id, Concept::new("travel", "d", vec![0.1]).into_node()).unwrap();
        engine.add_node(&ontology_id, Concept::new("journey", "d", vec![0.2]).into_node()).unwrap();
        (QueryFacade::new(engine), ontology_id)
    }

    #[test]
    fn match_concepts_only_returns_concept_labeled_nodes() {
        let (facade, ontology_id) = facade_with_concepts();
        let results = facade.match_concepts(&ontology_id, |_| true, None).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|n| n.label == NodeLabel::Concept));
    }

    #[test]
    fn count_concepts_applies_predicate() {
        let (facade, ontology_id) = facade_with_concepts();
        let count = facade
            .count_concepts(&ontology_id, |n| n.get_str("label") == Some("travel"))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn execute_raw_increments_raw_audit_count() {
        let (facade, ontology_id) = facade_with_concepts();
        facade.execute_raw(&ontology_id, None, |_| true).unwrap();
        let snapshot = facade.audit();
        assert_eq!(snapshot.raw, 1);
        assert_eq!(snapshot.safe, 0);
    }

    #[test]
    fn safe_calls_increment_safe_audit_count() {
        let (facade, ontology_id) = facade_with_concepts();
        facade.match_concepts(&ontology_id, |_| true, None).unwrap();
        facade.match_concepts(&ontology_id, |_| true, None).unwrap();
        let snapshot = facade.audit();
        assert_eq!(snapshot.safe, 2);
        assert_eq!(snapshot.raw, 0);
    }

    #[test]
    fn every_safe_method_emits_a_query_naming_its_label() {
        let (facade, ontology_id) = facade_with_concepts();

        facade.match_concepts(&ontology_id, |_| true, None).unwrap();
        assert!(facade.audit().safe > 0);
        let emitted = facade.audit.last_query().unwrap();
        assert!(emitted.contains("Concept"), "expected an explicit label in {emitted:?}");

        facade.match_sources(&ontology_id, |_| true, None).unwrap();
        assert!(facade.audit.last_query().unwrap().contains("Source"));

        facade.match_instances(&ontology_id, |_| true, None).unwrap();
        assert!(facade.audit.last_query().unwrap().contains("Instance"));

        facade.get_graph_stats(&ontology_id).unwrap();
        assert!(facade.audit.last_query().unwrap().contains("Concept"));
    }

    #[test]
    fn execute_substitutes_params_and_shapes_rows_by_column_spec() {
        let (facade, ontology_id) = facade_with_concepts();
        let mut params = HashMap::new();
        params.insert("label".to_string(), serde_json::json!("travel"));
        let rows = facade
            .execute(
                &ontology_id,
                "MATCH (c:Concept {label: $label}) RETURN c",
                &params,
                NodeLabel::Concept,
                |n| n.get_str("label") == Some("travel"),
                false,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn get_graph_stats_aggregates_namespaces() {
        let (facade, ontology_id) = facade_with_concepts();
        let stats = facade.get_graph_stats(&ontology_id).unwrap();
        assert_eq!(stats.concept_graph.concepts, 2);
        assert_eq!(stats.total_nodes, 2);
    }

    #[test]
    fn find_vocabulary_synonyms_filters_by_threshold_and_category() {
        let engine = Arc::new(GraphEngine::new());
        let vocab_id = engine.ontology_id_for_name(VOCABULARY_ONTOLOGY);

        let category = VocabCategory::new("causation");
        let category_id = category.node_id();
        engine.add_node(&vocab_id, category.into_node()).unwrap();

        let a = VocabType::builtin("CAUSES");
        let a_id = a.node_id();
        engine.add_node(&vocab_id, a.into_node()).unwrap();
        let b = VocabType::builtin("LEADS_TO");
        let b_id = b.node_id();
        engine.add_node(&vocab_id, b.into_node()).unwrap();

        engine.add_edge(&vocab_id, Edge::structural(a_id.clone(), category_id.clone(), IN_CATEGORY)).unwrap();
        engine.add_edge(&vocab_id, Edge::structural(b_id.clone(), category_id, IN_CATEGORY)).unwrap();

        let similar_edge = Edge::structural(a_id, b_id, crate::graph::SIMILAR_TO)
            .with_property("similarity", 0.92f64);
        engine.add_edge(&vocab_id, similar_edge).unwrap();

        let facade = QueryFacade::new(engine);
        let matches = facade.find_vocabulary_synonyms(0.9, Some("causation"), None).unwrap();
        assert_eq!(matches.len(), 1);

        let none_at_higher_category = facade.find_vocabulary_synonyms(0.9, Some("structural"), None).unwrap();
        assert!(none_at_higher_category.is_empty());
    }
}
