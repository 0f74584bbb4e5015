//! Deterministic in-process provider for tests, mirroring the teacher's
//! `MockClient` (examples/nrgforge-plexus/src/llm_orc.rs).

use crate::ai::{AiResult, Embedder, Extractor, Vision};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

pub struct MockProvider {
    extraction_response: Mutex<Option<Value>>,
    vision_response: Mutex<Option<String>>,
    dimensions: usize,
}

impl MockProvider {
    pub fn with_extraction(response: Value) -> Self {
        Self { extraction_response: Mutex::new(Some(response)), vision_response: Mutex::new(None), dimensions: 8 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { extraction_response: Mutex::new(None), vision_response: Mutex::new(None), dimensions }
    }

    pub fn with_vision(response: impl Into<String>) -> Self {
        Self { extraction_response: Mutex::new(None), vision_response: Mutex::new(Some(response.into())), dimensions: 8 }
    }
}

#[async_trait]
impl Extractor for MockProvider {
    async fn extract(&self, _prompt: &str, _input: &str) -> AiResult<Value> {
        Ok(self.extraction_response.lock().unwrap().clone().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Embedder for MockProvider {
    /// Deterministic hash-based pseudo-embedding: same text always yields
    /// the same vector, distinct text yields distinct (if not semantically
    /// meaningful) vectors. Good enough to exercise dedup/threshold logic
    /// in tests without a real model.
    async fn embed(&self, text: &str) -> AiResult<Vec<f32>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut out = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let bits = hasher.finish();
            out.push(((bits % 2000) as f32 / 1000.0) - 1.0);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl Vision for MockProvider {
    async fn describe(&self, _prompt: &str, _image_bytes: &[u8], _mime_type: &str) -> AiResult<String> {
        Ok(self.vision_response.lock().unwrap().clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic_per_text() {
        let provider = MockProvider::with_dimensions(4);
        assert_eq!(provider.embed("a").await.unwrap(), provider.embed("a").await.unwrap());
        assert_ne!(provider.embed("a").await.unwrap(), provider.embed("b").await.unwrap());
    }

    #[tokio::test]
    async fn vision_returns_configured_description() {
        let provider = MockProvider::with_vision("a diagram of a graph");
        let desc = provider.describe("describe this", b"fake-bytes", "image/png").await.unwrap();
        assert_eq!(desc, "a diagram of a graph");
    }
}
