//! The active embedding model/dimension pair (§4.5, §4.15). Changing this
//! is what triggers L5's "only-incompatible" bulk regeneration filter:
//! vectors whose dimension no longer matches are stale, everything else
//! is left alone.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { model: "nomic-embed-text-v1.5".to_string(), dimensions: 768 }
    }
}
