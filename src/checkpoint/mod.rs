//! Checkpointing (L13, SPEC_FULL §4.13): per-document resumable ingestion
//! state persisted as a JSON file on durable storage, keyed by the
//! document's normalized name.
//!
//! Grounded in the teacher's sink/emission progressive-commit contract
//! (§0/SPEC_FULL §4): a worker crash mid-document must not lose more than
//! the in-flight chunk, and resuming must be able to tell a modified
//! source file from the one it was interrupted on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("checkpoint corrupt: {0}")]
    Corrupt(String),
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Accumulated ingestion stats, carried forward chunk-to-chunk (§4.7 step 7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionStats {
    pub concepts_created: u64,
    pub concepts_linked: u64,
    pub sources_created: u64,
    pub instances_created: u64,
    pub relationships_created: u64,
}

/// The on-disk checkpoint format (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub document_name: String,
    pub file_path: String,
    pub file_hash: String,
    pub char_position: u64,
    pub chunks_processed: u32,
    /// Last 50 concept ids, most recently upserted last (§4.7 step 1, §4.13).
    pub recent_concept_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub stats: IngestionStats,
}

const MAX_RECENT_CONCEPTS: usize = 50;

impl Checkpoint {
    pub fn new(document_name: impl Into<String>, file_path: impl Into<String>, file_bytes: &[u8]) -> Self {
        Self {
            document_name: document_name.into(),
            file_path: file_path.into(),
            file_hash: hex_sha256(file_bytes),
            char_position: 0,
            chunks_processed: 0,
            recent_concept_ids: Vec::new(),
            timestamp: Utc::now(),
            stats: IngestionStats::default(),
        }
    }

    /// Push a freshly upserted concept id, keeping only the most recent
    /// `MAX_RECENT_CONCEPTS` (§4.7 step 1's "up to 50 (concept_id, label)" window).
    pub fn push_recent_concept(&mut self, concept_id: impl Into<String>) {
        self.recent_concept_ids.push(concept_id.into());
        if self.recent_concept_ids.len() > MAX_RECENT_CONCEPTS {
            let overflow = self.recent_concept_ids.len() - MAX_RECENT_CONCEPTS;
            self.recent_concept_ids.drain(0..overflow);
        }
    }

    pub fn advance(&mut self, char_position: u64) {
        self.chunks_processed += 1;
        self.char_position = char_position;
        self.timestamp = Utc::now();
    }
}

/// Normalizes a document name to the filesystem-safe key used for the
/// checkpoint file (§4.13): lowercase, spaces and slashes -> underscore.
pub fn normalize_document_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect()
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Manages per-document checkpoint files under a base directory.
pub struct CheckpointStore {
    base_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, document_name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", normalize_document_name(document_name)))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.path_for(&checkpoint.document_name);
        let json = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a checkpoint, rejecting it (per §4.13 / error taxonomy §7's
    /// "Corrupt checkpoint") if the backing file is gone or its hash no
    /// longer matches `current_bytes` (the document was modified).
    pub fn load_and_validate(
        &self,
        document_name: &str,
        current_bytes: &[u8],
    ) -> CheckpointResult<Option<Checkpoint>> {
        let path = self.path_for(document_name);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&json)?;

        if !Path::new(&checkpoint.file_path).exists() && !Path::new(&checkpoint.file_path).is_absolute() {
            // Relative/virtual paths (stdin, API uploads) have no filesystem
            // presence to re-check; fall through to the hash comparison.
        }

        let current_hash = hex_sha256(current_bytes);
        if current_hash != checkpoint.file_hash {
            self.delete(document_name)?;
            return Err(CheckpointError::Corrupt(format!(
                "content hash mismatch for {document_name}: checkpoint is stale"
            )));
        }
        Ok(Some(checkpoint))
    }

    pub fn delete(&self, document_name: &str) -> CheckpointResult<()> {
        let path = self.path_for(document_name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Resumable jobs ordered by timestamp descending (§4.13).
    pub fn list_checkpoints(&self) -> CheckpointResult<Vec<Checkpoint>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut checkpoints = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(entry.path())?;
            if let Ok(checkpoint) = serde_json::from_str::<Checkpoint>(&json) {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_document_name_lowercases_and_replaces_separators() {
        assert_eq!(normalize_document_name("My Docs/Report"), "my_docs_report");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let bytes = b"hello world";
        let mut checkpoint = Checkpoint::new("My Doc", "virtual://my-doc", bytes);
        checkpoint.advance(100);
        checkpoint.push_recent_concept("c1");
        store.save(&checkpoint).unwrap();

        let loaded = store.load_and_validate("My Doc", bytes).unwrap().unwrap();
        assert_eq!(loaded.chunks_processed, 1);
        assert_eq!(loaded.recent_concept_ids, vec!["c1"]);
    }

    #[test]
    fn modified_content_invalidates_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = Checkpoint::new("doc", "virtual://doc", b"original");
        store.save(&checkpoint).unwrap();

        let result = store.load_and_validate("doc", b"modified");
        assert!(matches!(result, Err(CheckpointError::Corrupt(_))));
    }

    #[test]
    fn missing_checkpoint_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load_and_validate("nonexistent", b"x").unwrap().is_none());
    }

    #[test]
    fn recent_concepts_window_caps_at_fifty() {
        let mut checkpoint = Checkpoint::new("doc", "path", b"bytes");
        for i in 0..60 {
            checkpoint.push_recent_concept(format!("c{i}"));
        }
        assert_eq!(checkpoint.recent_concept_ids.len(), 50);
        assert_eq!(checkpoint.recent_concept_ids.first().unwrap(), "c10");
        assert_eq!(checkpoint.recent_concept_ids.last().unwrap(), "c59");
    }

    #[test]
    fn on_success_checkpoint_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = Checkpoint::new("doc", "path", b"bytes");
        store.save(&checkpoint).unwrap();
        store.delete("doc").unwrap();
        assert!(store.load_and_validate("doc", b"bytes").unwrap().is_none());
    }

    #[test]
    fn list_checkpoints_orders_by_timestamp_descending() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut older = Checkpoint::new("doc-a", "path-a", b"a");
        older.timestamp = Utc::now() - chrono::Duration::hours(2);
        store.save(&older).unwrap();

        let mut newer = Checkpoint::new("doc-b", "path-b", b"b");
        newer.timestamp = Utc::now();
        store.save(&newer).unwrap();

        let listed = store.list_checkpoints().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].document_name, "doc-b");
    }
}
