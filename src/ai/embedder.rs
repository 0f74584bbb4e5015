//! Cosine similarity and the optional local (fastembed) embedder.
//!
//! Grounded in examples/nrgforge-plexus/src/adapter/embedding.rs's
//! `cosine_similarity` and `FastEmbedEmbedder`.

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(feature = "embeddings")]
mod fastembed_backend {
    use super::super::{AiError, AiResult, Embedder};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Local ONNX text embedder (nomic-embed-text-v1.5, 768-dim), run on a
    /// blocking thread since `fastembed`'s inference is synchronous.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl FastEmbedEmbedder {
        pub fn try_new() -> AiResult<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::NomicEmbedTextV15).with_show_download_progress(false),
            )
            .map_err(|e| AiError::Transport(e.to_string()))?;
            Ok(Self { model: Mutex::new(model), dimensions: 768 })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedEmbedder {
        async fn embed(&self, text: &str) -> AiResult<Vec<f32>> {
            let text = text.to_string();
            let embeddings = {
                let model = self.model.lock().unwrap();
                model.embed(vec![text], None).map_err(|e| AiError::Transport(e.to_string()))?
            };
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| AiError::MalformedOutput("empty embedding batch".to_string()))
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_backend::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.1, 0.5, -0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_return_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn zero_vector_returns_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
