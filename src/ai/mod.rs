//! AI Provider Abstraction (L4, SPEC_FULL §4.4).
//!
//! Capability traits (`Extractor`, `Embedder`, `Vision`) decouple the
//! ingestion pipeline (L6/L7), vocabulary manager (L5), and grounding
//! engine (L8) from any specific model vendor. Grounded in the teacher's
//! `llm_orc::LlmOrcClient` trait/`MockClient`/`SubprocessClient` shape
//! (examples/nrgforge-plexus/src/llm_orc.rs), re-targeted from an MCP
//! subprocess transport to HTTP (`reqwest`), per-provider semaphore
//! concurrency limits (config L15's `ProviderPolicy`), and jittered
//! exponential backoff retry (`retry.rs`).

pub mod embedder;
pub mod providers;
pub mod retry;
pub mod vector_store;

pub use embedder::cosine_similarity;
pub use retry::{with_retry, RetryPolicy};
pub use vector_store::{InMemoryVectorStore, VectorStore};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("provider rate-limited the request")]
    RateLimited,

    #[error("provider request exhausted retries: {0}")]
    RetriesExhausted(String),

    #[error("cancelled")]
    Cancelled,
}

pub type AiResult<T> = Result<T, AiError>;

/// Structured extraction: chunk text in, a JSON payload of candidate
/// concepts/edges out (§4.6's "LLM proposes, pipeline disposes" contract).
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, prompt: &str, input: &str) -> AiResult<Value>;
}

/// Text -> dense vector, used for upsert-by-meaning (L6/L7) and vocabulary
/// synonym detection (L5).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> AiResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> AiResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimensionality of vectors this embedder produces, used by L15's
    /// embedding-config compatibility check.
    fn dimensions(&self) -> usize;
}

/// Image/diagram description, used by the ingestion pipeline's image-chunk
/// handling (§4.6 Non-goal: the model itself is out of scope, only this
/// seam).
#[async_trait]
pub trait Vision: Send + Sync {
    async fn describe(&self, prompt: &str, image_bytes: &[u8], mime_type: &str) -> AiResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::providers::mock::MockProvider;

    #[tokio::test]
    async fn mock_provider_extracts_configured_response() {
        let provider = MockProvider::with_extraction(serde_json::json!({"concepts": []}));
        let result = provider.extract("extract concepts", "some text").await.unwrap();
        assert_eq!(result, serde_json::json!({"concepts": []}));
    }

    #[tokio::test]
    async fn mock_provider_embeds_deterministically() {
        let provider = MockProvider::with_dimensions(8);
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }
}
