//! SQLite storage backend for the knowledge graph engine.

use super::traits::{GraphStore, NodeFilter, OpenStore, StorageError, StorageResult, Subgraph};
use crate::graph::{Edge, EdgeId, EdgeProvenance, Node, NodeId, NodeLabel, Ontology, OntologyId};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// Per-ontology baseline: the set of node/edge IDs that were last loaded or saved.
/// Used by incremental `save_ontology()` to determine which IDs to delete.
type Baseline = (HashSet<String>, HashSet<String>); // (node_ids, edge_ids)

/// SQLite-backed graph store.
///
/// Uses a single SQLite database file with tables for ontologies, nodes, and
/// edges. Thread-safe via an internal mutex on the connection.
///
/// Tracks per-ontology "baselines" so that `save_ontology()` can perform
/// incremental upserts: nodes/edges added by another engine sharing the same
/// database since the last load are preserved, while nodes/edges explicitly
/// removed by this engine are deleted.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    baselines: Mutex<HashMap<String, Baseline>>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ontologies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                metadata_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT NOT NULL,
                ontology_id TEXT NOT NULL,
                label TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (ontology_id, id),
                FOREIGN KEY (ontology_id) REFERENCES ontologies(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(ontology_id, label);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT NOT NULL,
                ontology_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relationship TEXT NOT NULL,
                provenance_json TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                PRIMARY KEY (ontology_id, id),
                FOREIGN KEY (ontology_id) REFERENCES ontologies(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(ontology_id, source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(ontology_id, target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_relationship ON edges(ontology_id, relationship);

            PRAGMA foreign_keys = ON;

            -- WAL mode allows concurrent readers while a writer holds the lock.
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    fn node_to_row(node: &Node) -> StorageResult<(String, String, String, String)> {
        Ok((
            node.id.as_str().to_string(),
            node.label.as_str().to_string(),
            serde_json::to_string(&node.properties)?,
            node.created_at.to_rfc3339(),
        ))
    }

    fn row_to_node(id: String, label: String, properties_json: String, created_at: String) -> StorageResult<Node> {
        use chrono::DateTime;

        let label = NodeLabel::from_str(&label).map_err(StorageError::OntologyNotFound)?;
        Ok(Node {
            id: NodeId::from_string(id),
            label,
            properties: serde_json::from_str(&properties_json)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| StorageError::DateParse(e.to_string()))?
                .with_timezone(&chrono::Utc),
        })
    }

    fn edge_to_row(edge: &Edge) -> StorageResult<(String, String, String, String, String, String)> {
        Ok((
            edge.id.as_str().to_string(),
            edge.source.as_str().to_string(),
            edge.target.as_str().to_string(),
            edge.relationship.clone(),
            serde_json::to_string(&edge.provenance)?,
            serde_json::to_string(&edge.properties)?,
        ))
    }

    fn row_to_edge(
        id: String,
        source_id: String,
        target_id: String,
        relationship: String,
        provenance_json: String,
        properties_json: String,
    ) -> StorageResult<Edge> {
        let provenance: EdgeProvenance = serde_json::from_str(&provenance_json)?;
        Ok(Edge {
            id: EdgeId::from_string(id),
            source: NodeId::from_string(source_id),
            target: NodeId::from_string(target_id),
            relationship,
            provenance,
            properties: serde_json::from_str(&properties_json)?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            baselines: Mutex::new(HashMap::new()),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            baselines: Mutex::new(HashMap::new()),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Ontology operations ===

    fn save_ontology(&self, ontology: &Ontology) -> StorageResult<()> {
        {
            let conn = self.conn.lock().unwrap();
            let metadata_json = serde_json::to_string(&ontology.metadata)?;

            conn.execute(
                r#"
                INSERT INTO ontologies (id, name, description, metadata_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    metadata_json = excluded.metadata_json
                "#,
                params![ontology.id.as_str(), ontology.name, ontology.description, metadata_json],
            )?;
        }

        let conn = self.conn.lock().unwrap();

        // Incremental upsert: upsert nodes/edges currently in the ontology,
        // then delete only those that were in our baseline but are no longer
        // present (explicitly removed by this engine). Nodes/edges added by
        // another engine sharing the database are never in our baseline, so
        // they survive.
        let ontology_node_ids: HashSet<String> = ontology.nodes.keys().map(|id| id.to_string()).collect();

        for node in ontology.nodes.values() {
            let (id, label, properties, created_at) = Self::node_to_row(node)?;
            conn.execute(
                r#"
                INSERT INTO nodes (id, ontology_id, label, properties_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(ontology_id, id) DO UPDATE SET
                    label = excluded.label,
                    properties_json = excluded.properties_json
                "#,
                params![id, ontology.id.as_str(), label, properties, created_at],
            )?;
        }

        let ontology_edge_ids: HashSet<String> = ontology.edges.iter().map(|e| e.id.to_string()).collect();

        for edge in &ontology.edges {
            let (id, source, target, rel, provenance, props) = Self::edge_to_row(edge)?;
            conn.execute(
                r#"
                INSERT INTO edges (id, ontology_id, source_id, target_id, relationship, provenance_json, properties_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(ontology_id, id) DO UPDATE SET
                    source_id = excluded.source_id,
                    target_id = excluded.target_id,
                    relationship = excluded.relationship,
                    provenance_json = excluded.provenance_json,
                    properties_json = excluded.properties_json
                "#,
                params![id, ontology.id.as_str(), source, target, rel, provenance, props],
            )?;
        }

        {
            let baselines = self.baselines.lock().unwrap();
            if let Some((baseline_nodes, baseline_edges)) = baselines.get(ontology.id.as_str()) {
                for baseline_edge_id in baseline_edges {
                    if !ontology_edge_ids.contains(baseline_edge_id) {
                        conn.execute(
                            "DELETE FROM edges WHERE ontology_id = ?1 AND id = ?2",
                            params![ontology.id.as_str(), baseline_edge_id],
                        )?;
                    }
                }
                for baseline_node_id in baseline_nodes {
                    if !ontology_node_ids.contains(baseline_node_id) {
                        conn.execute(
                            "DELETE FROM nodes WHERE ontology_id = ?1 AND id = ?2",
                            params![ontology.id.as_str(), baseline_node_id],
                        )?;
                    }
                }
            }
        }

        self.baselines
            .lock()
            .unwrap()
            .insert(ontology.id.as_str().to_string(), (ontology_node_ids, ontology_edge_ids));

        Ok(())
    }

    fn load_ontology(&self, id: &OntologyId) -> StorageResult<Option<Ontology>> {
        let conn = self.conn.lock().unwrap();

        let ontology_row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT name, description, metadata_json FROM ontologies WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((name, description, metadata_json)) = ontology_row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, label, properties_json, created_at FROM nodes WHERE ontology_id = ?1",
        )?;
        let nodes_iter = stmt.query_map(params![id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
        })?;

        let mut nodes = HashMap::new();
        for row in nodes_iter {
            let (node_id, label, properties, created_at) = row?;
            let node = Self::row_to_node(node_id, label, properties, created_at)?;
            nodes.insert(node.id.clone(), node);
        }

        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relationship, provenance_json, properties_json
             FROM edges WHERE ontology_id = ?1",
        )?;
        let edges_iter = stmt.query_map(params![id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in edges_iter {
            let (eid, source, target, rel, provenance, props) = row?;
            edges.push(Self::row_to_edge(eid, source, target, rel, provenance, props)?);
        }

        let baseline_nodes: HashSet<String> = nodes.keys().map(|k| k.to_string()).collect();
        let baseline_edges: HashSet<String> = edges.iter().map(|e| e.id.to_string()).collect();
        self.baselines
            .lock()
            .unwrap()
            .insert(id.as_str().to_string(), (baseline_nodes, baseline_edges));

        Ok(Some(Ontology {
            id: id.clone(),
            name,
            description,
            nodes,
            edges,
            metadata: serde_json::from_str(&metadata_json)?,
        }))
    }

    fn delete_ontology(&self, id: &OntologyId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM ontologies WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn list_ontologies(&self) -> StorageResult<Vec<OntologyId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM ontologies")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(OntologyId::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // === Node operations ===

    fn save_node(&self, ontology_id: &OntologyId, node: &Node) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let (id, label, properties, created_at) = Self::node_to_row(node)?;

        conn.execute(
            r#"
            INSERT INTO nodes (id, ontology_id, label, properties_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(ontology_id, id) DO UPDATE SET
                label = excluded.label,
                properties_json = excluded.properties_json
            "#,
            params![id, ontology_id.as_str(), label, properties, created_at],
        )?;

        Ok(())
    }

    fn load_node(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, String, String, String)> = conn
            .query_row(
                "SELECT id, label, properties_json, created_at FROM nodes WHERE ontology_id = ?1 AND id = ?2",
                params![ontology_id.as_str(), node_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((id, label, properties, created_at)) => Ok(Some(Self::row_to_node(id, label, properties, created_at)?)),
            None => Ok(None),
        }
    }

    fn delete_node(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "DELETE FROM edges WHERE ontology_id = ?1 AND (source_id = ?2 OR target_id = ?2)",
            params![ontology_id.as_str(), node_id.as_str()],
        )?;

        let rows = conn.execute(
            "DELETE FROM nodes WHERE ontology_id = ?1 AND id = ?2",
            params![ontology_id.as_str(), node_id.as_str()],
        )?;

        Ok(rows > 0)
    }

    fn find_nodes(&self, ontology_id: &OntologyId, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        let conn = self.conn.lock().unwrap();

        let mut sql =
            String::from("SELECT id, label, properties_json, created_at FROM nodes WHERE ontology_id = ?1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(ontology_id.as_str().to_string())];

        if let Some(label) = filter.label {
            sql.push_str(" AND label = ?");
            params_vec.push(Box::new(label.as_str().to_string()));
        }

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let nodes_iter = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
        })?;

        let mut nodes = Vec::new();
        for row in nodes_iter {
            let (id, label, properties, created_at) = row?;
            nodes.push(Self::row_to_node(id, label, properties, created_at)?);
        }

        Ok(nodes)
    }

    // === Edge operations ===

    fn save_edge(&self, ontology_id: &OntologyId, edge: &Edge) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let (id, source, target, rel, provenance, props) = Self::edge_to_row(edge)?;

        conn.execute(
            r#"
            INSERT INTO edges (id, ontology_id, source_id, target_id, relationship, provenance_json, properties_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(ontology_id, id) DO UPDATE SET
                source_id = excluded.source_id,
                target_id = excluded.target_id,
                relationship = excluded.relationship,
                provenance_json = excluded.provenance_json,
                properties_json = excluded.properties_json
            "#,
            params![id, ontology_id.as_str(), source, target, rel, provenance, props],
        )?;

        Ok(())
    }

    fn get_edges_from(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relationship, provenance_json, properties_json
             FROM edges WHERE ontology_id = ?1 AND source_id = ?2",
        )?;

        let edges_iter = stmt.query_map(params![ontology_id.as_str(), node_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in edges_iter {
            let (id, source, target, rel, provenance, props) = row?;
            edges.push(Self::row_to_edge(id, source, target, rel, provenance, props)?);
        }

        Ok(edges)
    }

    fn get_edges_to(&self, ontology_id: &OntologyId, node_id: &NodeId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relationship, provenance_json, properties_json
             FROM edges WHERE ontology_id = ?1 AND target_id = ?2",
        )?;

        let edges_iter = stmt.query_map(params![ontology_id.as_str(), node_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in edges_iter {
            let (id, source, target, rel, provenance, props) = row?;
            edges.push(Self::row_to_edge(id, source, target, rel, provenance, props)?);
        }

        Ok(edges)
    }

    fn delete_edge(&self, ontology_id: &OntologyId, edge_id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM edges WHERE ontology_id = ?1 AND id = ?2",
            params![ontology_id.as_str(), edge_id],
        )?;
        Ok(rows > 0)
    }

    // === Subgraph operations ===

    fn load_subgraph(&self, ontology_id: &OntologyId, seeds: &[NodeId], max_depth: usize) -> StorageResult<Subgraph> {
        if seeds.is_empty() || max_depth == 0 {
            return Ok(Subgraph { nodes: Vec::new(), edges: Vec::new() });
        }

        let conn = self.conn.lock().unwrap();

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = seeds.iter().map(|n| n.as_str().to_string()).collect();

        for seed in &frontier {
            visited.insert(seed.clone());
        }

        for _depth in 0..max_depth {
            if frontier.is_empty() {
                break;
            }

            let mut next_frontier = Vec::new();

            for node_id in &frontier {
                let mut stmt =
                    conn.prepare("SELECT target_id FROM edges WHERE ontology_id = ?1 AND source_id = ?2")?;
                let targets = stmt
                    .query_map(params![ontology_id.as_str(), node_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                for target in targets {
                    if visited.insert(target.clone()) {
                        next_frontier.push(target);
                    }
                }

                let mut stmt =
                    conn.prepare("SELECT source_id FROM edges WHERE ontology_id = ?1 AND target_id = ?2")?;
                let sources = stmt
                    .query_map(params![ontology_id.as_str(), node_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                for source in sources {
                    if visited.insert(source.clone()) {
                        next_frontier.push(source);
                    }
                }
            }

            frontier = next_frontier;
        }

        let mut nodes = Vec::new();
        for node_id in &visited {
            let row: Option<(String, String, String, String)> = conn
                .query_row(
                    "SELECT id, label, properties_json, created_at FROM nodes WHERE ontology_id = ?1 AND id = ?2",
                    params![ontology_id.as_str(), node_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            if let Some((id, label, properties, created_at)) = row {
                nodes.push(Self::row_to_node(id, label, properties, created_at)?);
            }
        }

        let placeholders: Vec<&str> = visited.iter().map(|_| "?").collect();
        let in_clause = placeholders.join(",");

        let sql = format!(
            "SELECT id, source_id, target_id, relationship, provenance_json, properties_json
             FROM edges
             WHERE ontology_id = ?1
               AND source_id IN ({})
               AND target_id IN ({})",
            in_clause, in_clause
        );

        let mut params_vec: Vec<String> = vec![ontology_id.as_str().to_string()];
        params_vec.extend(visited.iter().cloned());
        params_vec.extend(visited.iter().cloned());

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

        let edges_iter = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in edges_iter {
            let (id, source, target, rel, provenance, props) = row?;
            edges.push(Self::row_to_edge(id, source, target, rel, provenance, props)?);
        }

        Ok(Subgraph { nodes, edges })
    }

    fn data_version(&self) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let version: i64 = conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeProvenance, EdgeSource, Node, NodeLabel, Ontology, PropertyValue};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create_test_ontology() -> Ontology {
        Ontology::new("test-ontology").with_description("A test ontology")
    }

    fn create_test_node(id: &str, label: NodeLabel) -> Node {
        Node::new(label).with_id(NodeId::from_string(id))
    }

    #[test]
    fn test_save_and_load_ontology() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();

        store.save_ontology(&ontology).unwrap();

        let loaded = store.load_ontology(&ontology_id).unwrap();
        assert!(loaded.is_some());

        let loaded = loaded.unwrap();
        assert_eq!(loaded.name, "test-ontology");
        assert_eq!(loaded.description, Some("A test ontology".to_string()));
    }

    #[test]
    fn test_list_ontologies() {
        let store = create_test_store();

        let o1 = Ontology::new("ontology-1");
        let o2 = Ontology::new("ontology-2");

        store.save_ontology(&o1).unwrap();
        store.save_ontology(&o2).unwrap();

        let ontologies = store.list_ontologies().unwrap();
        assert_eq!(ontologies.len(), 2);
    }

    #[test]
    fn test_delete_ontology() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();

        store.save_ontology(&ontology).unwrap();
        assert!(store.load_ontology(&ontology_id).unwrap().is_some());

        let deleted = store.delete_ontology(&ontology_id).unwrap();
        assert!(deleted);

        assert!(store.load_ontology(&ontology_id).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_node() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();
        store.save_ontology(&ontology).unwrap();

        let node = create_test_node("concept:travel", NodeLabel::Concept)
            .with_property("label", PropertyValue::String("travel".to_string()));
        let node_id = node.id.clone();

        store.save_node(&ontology_id, &node).unwrap();

        let loaded = store.load_node(&ontology_id, &node_id).unwrap();
        assert!(loaded.is_some());

        let loaded = loaded.unwrap();
        assert_eq!(loaded.label, NodeLabel::Concept);
        assert_eq!(loaded.properties.get("label"), Some(&PropertyValue::String("travel".to_string())));
    }

    #[test]
    fn test_find_nodes_by_label() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();
        store.save_ontology(&ontology).unwrap();

        store.save_node(&ontology_id, &create_test_node("concept:a", NodeLabel::Concept)).unwrap();
        store.save_node(&ontology_id, &create_test_node("concept:b", NodeLabel::Concept)).unwrap();
        store.save_node(&ontology_id, &create_test_node("instance:a", NodeLabel::Instance)).unwrap();

        let concepts = store
            .find_nodes(&ontology_id, &NodeFilter::new().with_label(NodeLabel::Concept))
            .unwrap();
        assert_eq!(concepts.len(), 2);

        let instances = store
            .find_nodes(&ontology_id, &NodeFilter::new().with_label(NodeLabel::Instance))
            .unwrap();
        assert_eq!(instances.len(), 1);
    }

    #[test]
    fn test_save_and_get_edges() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();
        store.save_ontology(&ontology).unwrap();

        let node_a = create_test_node("concept:a", NodeLabel::Concept);
        let node_b = create_test_node("concept:b", NodeLabel::Concept);
        store.save_node(&ontology_id, &node_a).unwrap();
        store.save_node(&ontology_id, &node_b).unwrap();

        let edge = Edge::new(
            node_a.id.clone(),
            node_b.id.clone(),
            "CAUSES",
            EdgeProvenance::new("causation", EdgeSource::LlmExtraction),
        );
        store.save_edge(&ontology_id, &edge).unwrap();

        let edges_from_a = store.get_edges_from(&ontology_id, &node_a.id).unwrap();
        assert_eq!(edges_from_a.len(), 1);
        assert_eq!(edges_from_a[0].relationship, "CAUSES");

        let edges_to_b = store.get_edges_to(&ontology_id, &node_b.id).unwrap();
        assert_eq!(edges_to_b.len(), 1);
    }

    #[test]
    fn test_delete_node_cascades_edges() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();
        store.save_ontology(&ontology).unwrap();

        let node_a = create_test_node("concept:a", NodeLabel::Concept);
        let node_b = create_test_node("concept:b", NodeLabel::Concept);
        store.save_node(&ontology_id, &node_a).unwrap();
        store.save_node(&ontology_id, &node_b).unwrap();

        let edge = Edge::new(
            node_a.id.clone(),
            node_b.id.clone(),
            "CAUSES",
            EdgeProvenance::new("causation", EdgeSource::LlmExtraction),
        );
        store.save_edge(&ontology_id, &edge).unwrap();

        store.delete_node(&ontology_id, &node_a.id).unwrap();

        let edges_to_b = store.get_edges_to(&ontology_id, &node_b.id).unwrap();
        assert_eq!(edges_to_b.len(), 0);
    }

    #[test]
    fn test_load_subgraph() {
        let store = create_test_store();
        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();
        store.save_ontology(&ontology).unwrap();

        let nodes: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| create_test_node(&format!("concept:{}", id), NodeLabel::Concept))
            .collect();

        for node in &nodes {
            store.save_node(&ontology_id, node).unwrap();
        }

        let prov = || EdgeProvenance::new("test", EdgeSource::LlmExtraction);
        store.save_edge(&ontology_id, &Edge::new(nodes[0].id.clone(), nodes[1].id.clone(), "CAUSES", prov())).unwrap();
        store.save_edge(&ontology_id, &Edge::new(nodes[1].id.clone(), nodes[2].id.clone(), "CAUSES", prov())).unwrap();
        store.save_edge(&ontology_id, &Edge::new(nodes[2].id.clone(), nodes[3].id.clone(), "CAUSES", prov())).unwrap();

        let subgraph = store.load_subgraph(&ontology_id, &[nodes[0].id.clone()], 2).unwrap();

        assert_eq!(subgraph.nodes.len(), 3);
        assert_eq!(subgraph.edges.len(), 2);
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String =
            store.conn.lock().unwrap().query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();

        assert_eq!(journal_mode, "wal", "SqliteStore must enable WAL mode at connection time");
    }

    #[test]
    fn test_concurrent_read_during_write() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-concurrent.db");

        let store_a = SqliteStore::open(&db_path).unwrap();
        let store_b = SqliteStore::open(&db_path).unwrap();

        let ontology = create_test_ontology();
        let ontology_id = ontology.id.clone();
        store_a.save_ontology(&ontology).unwrap();

        {
            let conn_a = store_a.conn.lock().unwrap();
            conn_a.execute("BEGIN IMMEDIATE", []).unwrap();
            conn_a
                .execute(
                    "INSERT INTO nodes (id, ontology_id, label, properties_json, created_at) VALUES (?1, ?2, 'Concept', '{}', '2026-01-01T00:00:00Z')",
                    params!["concept:writing", ontology_id.to_string()],
                )
                .unwrap();

            let loaded = store_b.load_ontology(&ontology_id).unwrap();
            assert!(loaded.is_some(), "concurrent read must succeed during write (WAL mode)");

            conn_a.execute("COMMIT", []).unwrap();
        }
    }

    #[test]
    fn test_incremental_save_preserves_nodes_from_another_engine() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("shared.db");

        let store_a = SqliteStore::open(&db_path).unwrap();
        let store_b = SqliteStore::open(&db_path).unwrap();

        let ontology = Ontology::new("shared");
        let ontology_id = ontology.id.clone();
        store_a.save_ontology(&ontology).unwrap();

        let mut ontology_a = store_a.load_ontology(&ontology_id).unwrap().unwrap();
        ontology_a.add_node(create_test_node("concept:a", NodeLabel::Concept));
        store_a.save_ontology(&ontology_a).unwrap();

        let mut ontology_b = store_b.load_ontology(&ontology_id).unwrap().unwrap();
        ontology_b.add_node(create_test_node("concept:b", NodeLabel::Concept));
        store_b.save_ontology(&ontology_b).unwrap();

        ontology_a.add_node(create_test_node("concept:c", NodeLabel::Concept));
        store_a.save_ontology(&ontology_a).unwrap();

        let loaded = store_a.load_ontology(&ontology_id).unwrap().unwrap();
        assert!(loaded.nodes.contains_key(&NodeId::from_string("concept:a")), "concept:a must survive");
        assert!(
            loaded.nodes.contains_key(&NodeId::from_string("concept:b")),
            "concept:b must survive save_ontology from an engine with a stale cache"
        );
        assert!(loaded.nodes.contains_key(&NodeId::from_string("concept:c")), "concept:c must be added");
    }

    #[test]
    fn test_incremental_save_upserts_modified_nodes() {
        let store = create_test_store();
        let mut ontology = Ontology::new("project");
        let ontology_id = ontology.id.clone();

        let node = create_test_node("concept:travel", NodeLabel::Concept)
            .with_property("source_count", PropertyValue::Int(1));
        ontology.add_node(node);
        store.save_ontology(&ontology).unwrap();

        let node = ontology.nodes.get_mut(&NodeId::from_string("concept:travel")).unwrap();
        node.properties.insert("source_count".to_string(), PropertyValue::Int(2));
        store.save_ontology(&ontology).unwrap();

        let loaded = store.load_ontology(&ontology_id).unwrap().unwrap();
        let travel = loaded.nodes.get(&NodeId::from_string("concept:travel")).unwrap();
        assert_eq!(travel.properties.get("source_count"), Some(&PropertyValue::Int(2)));
        assert_eq!(loaded.nodes.len(), 1);
    }

    #[test]
    fn test_incremental_save_handles_node_removal() {
        let store = create_test_store();
        let mut ontology = Ontology::new("project");
        let ontology_id = ontology.id.clone();

        ontology.add_node(create_test_node("concept:a", NodeLabel::Concept));
        ontology.add_node(create_test_node("concept:b", NodeLabel::Concept));
        store.save_ontology(&ontology).unwrap();

        ontology.nodes.remove(&NodeId::from_string("concept:b"));
        store.save_ontology(&ontology).unwrap();

        let loaded = store.load_ontology(&ontology_id).unwrap().unwrap();
        assert!(loaded.nodes.contains_key(&NodeId::from_string("concept:a")));
        assert!(
            !loaded.nodes.contains_key(&NodeId::from_string("concept:b")),
            "concept:b must be removed from the database after save_ontology"
        );
    }

    #[test]
    fn test_incremental_save_handles_edge_removal() {
        let store = create_test_store();
        let mut ontology = Ontology::new("project");
        let ontology_id = ontology.id.clone();

        let a = create_test_node("concept:a", NodeLabel::Concept);
        let b = create_test_node("concept:b", NodeLabel::Concept);
        ontology.add_node(a.clone());
        ontology.add_node(b.clone());

        let edge = Edge::new(a.id.clone(), b.id.clone(), "RELATED_TO", EdgeProvenance::new("test", EdgeSource::LlmExtraction));
        ontology.add_edge(edge);
        store.save_ontology(&ontology).unwrap();

        ontology.edges.clear();
        store.save_ontology(&ontology).unwrap();

        let loaded = store.load_ontology(&ontology_id).unwrap().unwrap();
        assert!(loaded.edges.is_empty(), "edge must be removed after save_ontology");
        assert_eq!(loaded.nodes.len(), 2);
    }

    #[test]
    fn test_data_version_changes_after_external_write() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("coherence.db");

        let store_a = SqliteStore::open(&db_path).unwrap();
        let store_b = SqliteStore::open(&db_path).unwrap();

        let ontology = Ontology::new("shared");
        let ontology_id = ontology.id.clone();
        store_a.save_ontology(&ontology).unwrap();

        let v1 = store_a.data_version().unwrap();

        let mut ontology_b = store_b.load_ontology(&ontology_id).unwrap().unwrap();
        ontology_b.add_node(create_test_node("concept:ext", NodeLabel::Concept));
        store_b.save_ontology(&ontology_b).unwrap();

        let v2 = store_a.data_version().unwrap();
        assert_ne!(v1, v2, "data_version must change after an external write");
    }

    #[test]
    fn test_data_version_unchanged_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("no-change.db");

        let store = SqliteStore::open(&db_path).unwrap();
        let ontology = Ontology::new("test");
        store.save_ontology(&ontology).unwrap();

        let v1 = store.data_version().unwrap();
        let v2 = store.data_version().unwrap();
        assert_eq!(v1, v2, "data_version must be stable when no external writes occur");
    }
}
