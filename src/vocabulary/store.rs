//! Relational backing for the vocabulary manager: `relationship_vocabulary`
//! (one row per VocabType name) and `vocabulary_history` (append-only merge
//! log), following the same `rusqlite` schema-init/row-mapping style as
//! `config::table` and `metrics::GraphMetrics`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("date parsing error: {0}")]
    DateParse(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A `relationship_vocabulary` row (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyRow {
    pub name: String,
    pub category: String,
    /// `"builtin"` or `"computed"` (§4.5.1).
    pub category_source: String,
    pub category_confidence: Option<f32>,
    pub category_scores: Option<std::collections::HashMap<String, f32>>,
    pub category_ambiguous: bool,
    pub description: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub synonyms: Vec<String>,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
    pub is_active: bool,
    pub deprecation_reason: Option<String>,
}

/// Partial update for `update()` (§4.5 step 2): `None` fields are left
/// untouched, matching the "no-op when no fields provided" contract.
#[derive(Debug, Clone, Default)]
pub struct VocabularyPatch {
    pub description: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub deprecation_reason: Option<String>,
}

impl VocabularyPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.category.is_none()
            && self.is_active.is_none()
            && self.deprecation_reason.is_none()
    }
}

/// A `vocabulary_history` row to append (§4.5 step 3).
#[derive(Debug, Clone)]
pub struct VocabularyHistoryInsert {
    pub action: String,
    pub type_name: String,
    pub performed_by: String,
    pub target_type: Option<String>,
    pub reason: Option<String>,
}

pub struct VocabularyStore {
    conn: Mutex<Connection>,
}

impl VocabularyStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS relationship_vocabulary (
                name TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                category_source TEXT NOT NULL,
                category_confidence REAL,
                category_scores TEXT,
                category_ambiguous INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                embedding TEXT,
                embedding_model TEXT,
                synonyms TEXT NOT NULL DEFAULT '[]',
                added_by TEXT NOT NULL,
                added_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                deprecation_reason TEXT
            );
            CREATE TABLE IF NOT EXISTS vocabulary_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                type_name TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                target_type TEXT,
                reason TEXT,
                performed_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn get(&self, name: &str) -> StoreResult<Option<VocabularyRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, category, category_source, category_confidence, category_scores,
                        category_ambiguous, description, embedding, embedding_model, synonyms,
                        added_by, added_at, is_active, deprecation_reason
                 FROM relationship_vocabulary WHERE name = ?1",
                params![name],
                row_to_vocabulary_row,
            )
            .optional()?;
        row.transpose()
    }

    /// Insert the row unless a row for this name already exists. Returns
    /// `true` if inserted (§4.5 step 1's "duplicates return already-exists").
    pub fn insert_if_absent(&self, row: &VocabularyRow) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO relationship_vocabulary
                (name, category, category_source, category_confidence, category_scores,
                 category_ambiguous, description, embedding, embedding_model, synonyms,
                 added_by, added_at, is_active, deprecation_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.name,
                row.category,
                row.category_source,
                row.category_confidence,
                row.category_scores.as_ref().map(serde_json::to_string).transpose()?,
                row.category_ambiguous,
                row.description,
                row.embedding.as_ref().map(serde_json::to_string).transpose()?,
                row.embedding_model,
                serde_json::to_string(&row.synonyms)?,
                row.added_by,
                row.added_at.to_rfc3339(),
                row.is_active,
                row.deprecation_reason,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn update(&self, name: &str, patch: &VocabularyPatch) -> StoreResult<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        let conn = self.conn.lock().unwrap();
        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(ref description) = patch.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(ref category) = patch.category {
            sets.push("category = ?");
            values.push(Box::new(category.clone()));
        }
        if let Some(is_active) = patch.is_active {
            sets.push("is_active = ?");
            values.push(Box::new(is_active));
        }
        if let Some(ref reason) = patch.deprecation_reason {
            sets.push("deprecation_reason = ?");
            values.push(Box::new(reason.clone()));
        }
        let sql = format!("UPDATE relationship_vocabulary SET {} WHERE name = ?", sets.join(", "));
        values.push(Box::new(name.to_string()));
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = conn.execute(&sql, params.as_slice())?;
        Ok(changed > 0)
    }

    pub fn set_embedding(&self, name: &str, embedding: &[f32], model: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE relationship_vocabulary SET embedding = ?2, embedding_model = ?3 WHERE name = ?1",
            params![name, serde_json::to_string(embedding)?, model],
        )?;
        Ok(())
    }

    pub fn set_category(
        &self,
        name: &str,
        category: &str,
        source: &str,
        confidence: f32,
        scores: &std::collections::HashMap<String, f32>,
        ambiguous: bool,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE relationship_vocabulary
             SET category = ?2, category_source = ?3, category_confidence = ?4,
                 category_scores = ?5, category_ambiguous = ?6
             WHERE name = ?1",
            params![name, category, source, confidence, serde_json::to_string(scores)?, ambiguous],
        )?;
        Ok(())
    }

    pub fn set_synonyms(&self, name: &str, synonyms: &[String]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE relationship_vocabulary SET synonyms = ?2 WHERE name = ?1",
            params![name, serde_json::to_string(synonyms)?],
        )?;
        Ok(())
    }

    pub fn deactivate(&self, name: &str, reason: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE relationship_vocabulary SET is_active = 0, deprecation_reason = ?2 WHERE name = ?1",
            params![name, reason],
        )?;
        Ok(())
    }

    pub fn append_history(&self, entry: &VocabularyHistoryInsert) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vocabulary_history (action, type_name, performed_by, target_type, reason, performed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.action,
                entry.type_name,
                entry.performed_by,
                entry.target_type,
                entry.reason,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_all(&self) -> StoreResult<Vec<VocabularyRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, category, category_source, category_confidence, category_scores,
                    category_ambiguous, description, embedding, embedding_model, synonyms,
                    added_by, added_at, is_active, deprecation_reason
             FROM relationship_vocabulary ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_vocabulary_row)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }

    pub fn list_missing_embeddings(&self) -> StoreResult<Vec<VocabularyRow>> {
        Ok(self.list_all()?.into_iter().filter(|r| r.embedding.is_none()).collect())
    }

    pub fn list_incompatible_embeddings(&self, model: &str, dimensions: usize) -> StoreResult<Vec<VocabularyRow>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| match (&r.embedding, &r.embedding_model) {
                (Some(embedding), Some(existing_model)) => {
                    embedding.len() != dimensions || existing_model != model
                }
                (Some(embedding), None) => embedding.len() != dimensions,
                (None, _) => false,
            })
            .collect())
    }
}

fn row_to_vocabulary_row(row: &rusqlite::Row) -> rusqlite::Result<StoreResult<VocabularyRow>> {
    let name: String = row.get(0)?;
    let category: String = row.get(1)?;
    let category_source: String = row.get(2)?;
    let category_confidence: Option<f32> = row.get(3)?;
    let category_scores_json: Option<String> = row.get(4)?;
    let category_ambiguous: bool = row.get(5)?;
    let description: Option<String> = row.get(6)?;
    let embedding_json: Option<String> = row.get(7)?;
    let embedding_model: Option<String> = row.get(8)?;
    let synonyms_json: String = row.get(9)?;
    let added_by: String = row.get(10)?;
    let added_at: String = row.get(11)?;
    let is_active: bool = row.get(12)?;
    let deprecation_reason: Option<String> = row.get(13)?;

    Ok((|| -> StoreResult<VocabularyRow> {
        Ok(VocabularyRow {
            name,
            category,
            category_source,
            category_confidence,
            category_scores: category_scores_json.map(|s| serde_json::from_str(&s)).transpose()?,
            category_ambiguous,
            description,
            embedding: embedding_json.map(|s| serde_json::from_str(&s)).transpose()?,
            embedding_model,
            synonyms: serde_json::from_str(&synonyms_json)?,
            added_by,
            added_at: DateTime::parse_from_rfc3339(&added_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::DateParse(e.to_string()))?,
            is_active,
            deprecation_reason,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(name: &str) -> VocabularyRow {
        VocabularyRow {
            name: name.to_string(),
            category: "causation".to_string(),
            category_source: "builtin".to_string(),
            category_confidence: None,
            category_scores: None,
            category_ambiguous: false,
            description: Some("causes something".to_string()),
            embedding: None,
            embedding_model: None,
            synonyms: Vec::new(),
            added_by: "system".to_string(),
            added_at: Utc::now(),
            is_active: true,
            deprecation_reason: None,
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = VocabularyStore::open_in_memory().unwrap();
        assert!(store.insert_if_absent(&sample_row("CAUSES")).unwrap());
        let row = store.get("CAUSES").unwrap().unwrap();
        assert_eq!(row.category, "causation");
        assert!(row.is_active);
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let store = VocabularyStore::open_in_memory().unwrap();
        assert!(store.insert_if_absent(&sample_row("CAUSES")).unwrap());
        assert!(!store.insert_if_absent(&sample_row("CAUSES")).unwrap());
    }

    #[test]
    fn update_with_empty_patch_is_no_op() {
        let store = VocabularyStore::open_in_memory().unwrap();
        store.insert_if_absent(&sample_row("CAUSES")).unwrap();
        assert!(!store.update("CAUSES", &VocabularyPatch::default()).unwrap());
    }

    #[test]
    fn update_partial_fields_only_changes_those() {
        let store = VocabularyStore::open_in_memory().unwrap();
        store.insert_if_absent(&sample_row("CAUSES")).unwrap();
        let patch = VocabularyPatch { description: Some("new description".into()), ..Default::default() };
        assert!(store.update("CAUSES", &patch).unwrap());
        let row = store.get("CAUSES").unwrap().unwrap();
        assert_eq!(row.description.as_deref(), Some("new description"));
        assert_eq!(row.category, "causation");
    }

    #[test]
    fn deactivate_sets_reason_and_clears_active() {
        let store = VocabularyStore::open_in_memory().unwrap();
        store.insert_if_absent(&sample_row("OLD_CAUSES")).unwrap();
        store.deactivate("OLD_CAUSES", "Merged into CAUSES").unwrap();
        let row = store.get("OLD_CAUSES").unwrap().unwrap();
        assert!(!row.is_active);
        assert_eq!(row.deprecation_reason.as_deref(), Some("Merged into CAUSES"));
    }

    #[test]
    fn list_missing_embeddings_excludes_embedded_rows() {
        let store = VocabularyStore::open_in_memory().unwrap();
        store.insert_if_absent(&sample_row("CAUSES")).unwrap();
        store.insert_if_absent(&sample_row("ENABLES")).unwrap();
        store.set_embedding("CAUSES", &[0.1, 0.2], "nomic-embed-text-v1.5").unwrap();

        let missing = store.list_missing_embeddings().unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "ENABLES");
    }

    #[test]
    fn list_incompatible_embeddings_flags_dimension_mismatch() {
        let store = VocabularyStore::open_in_memory().unwrap();
        store.insert_if_absent(&sample_row("CAUSES")).unwrap();
        store.set_embedding("CAUSES", &[0.1, 0.2], "nomic-embed-text-v1.5").unwrap();

        let incompatible = store.list_incompatible_embeddings("nomic-embed-text-v1.5", 768).unwrap();
        assert_eq!(incompatible.len(), 1);

        let compatible = store.list_incompatible_embeddings("nomic-embed-text-v1.5", 2).unwrap();
        assert!(compatible.is_empty());
    }

    #[test]
    fn history_entries_append_without_overwriting() {
        let store = VocabularyStore::open_in_memory().unwrap();
        store
            .append_history(&VocabularyHistoryInsert {
                action: "merged".into(),
                type_name: "OLD_CAUSES".into(),
                performed_by: "admin".into(),
                target_type: Some("CAUSES".into()),
                reason: Some("duplicate".into()),
            })
            .unwrap();
        // No direct read accessor is exposed yet; this exercises the insert path
        // end-to-end (schema + types) without panicking.
    }
}
