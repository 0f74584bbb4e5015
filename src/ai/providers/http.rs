//! Generic HTTP-backed provider (SPEC_FULL §4.4): works against any
//! chat-completions-shaped endpoint (Anthropic/OpenAI-compatible) and any
//! embeddings endpoint. One instance per configured provider; concurrency
//! is bounded by a `tokio::sync::Semaphore` sized from `ProviderPolicy`
//! (config L15), and every call goes through `retry::with_retry`.
//!
//! Grounded in the teacher's `SubprocessClient` (examples/nrgforge-plexus/
//! src/llm_orc.rs) for the retry-around-transport shape, re-targeted from
//! spawning an MCP subprocess to issuing a `reqwest::Client` request.

use crate::ai::retry::{with_retry, RetryPolicy};
use crate::ai::{AiError, AiResult, Embedder, Extractor, Vision};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub extraction_model: String,
    pub embedding_model: String,
    pub vision_model: String,
    pub embedding_dimensions: usize,
}

/// Shared HTTP transport for one AI provider, gating concurrency at
/// `max_concurrent` in-flight requests and retrying transient failures
/// per `retry_policy`.
pub struct HttpProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
    semaphore: Arc<Semaphore>,
    retry_policy: RetryPolicy,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig, max_concurrent: usize, retry_policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retry_policy,
        }
    }

    async fn post_json(&self, path: &str, body: Value) -> AiResult<Value> {
        let _permit = self.semaphore.acquire().await.map_err(|_| AiError::Cancelled)?;
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AiError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(AiError::Transport(format!("HTTP {}", response.status())));
        }
        response.json::<Value>().await.map_err(|e| AiError::MalformedOutput(e.to_string()))
    }
}

#[async_trait]
impl Extractor for HttpProvider {
    async fn extract(&self, prompt: &str, input: &str) -> AiResult<Value> {
        with_retry(self.retry_policy, || async {
            let body = json!({
                "model": self.config.extraction_model,
                "messages": [
                    {"role": "system", "content": prompt},
                    {"role": "user", "content": input},
                ],
                "response_format": {"type": "json_object"},
            });
            let response = self.post_json("/v1/chat/completions", body).await?;
            extract_message_json(&response)
        })
        .await
    }
}

#[async_trait]
impl Embedder for HttpProvider {
    async fn embed(&self, text: &str) -> AiResult<Vec<f32>> {
        with_retry(self.retry_policy, || async {
            let body = json!({"model": self.config.embedding_model, "input": text});
            let response = self.post_json("/v1/embeddings", body).await?;
            extract_embedding_vector(&response)
        })
        .await
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }
}

#[async_trait]
impl Vision for HttpProvider {
    async fn describe(&self, prompt: &str, image_bytes: &[u8], mime_type: &str) -> AiResult<String> {
        let encoded = STANDARD.encode(image_bytes);
        with_retry(self.retry_policy, || async {
            let body = json!({
                "model": self.config.vision_model,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt},
                        {"type": "image_url", "image_url": {"url": format!("data:{mime_type};base64,{encoded}")}},
                    ],
                }],
            });
            let response = self.post_json("/v1/chat/completions", body).await?;
            extract_message_text(&response)
        })
        .await
    }
}

fn extract_message_json(response: &Value) -> AiResult<Value> {
    let content = extract_message_text(response)?;
    serde_json::from_str(&content).map_err(|e| AiError::MalformedOutput(e.to_string()))
}

fn extract_message_text(response: &Value) -> AiResult<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AiError::MalformedOutput("missing choices[0].message.content".to_string()))
}

fn extract_embedding_vector(response: &Value) -> AiResult<Vec<f32>> {
    let arr = response
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::MalformedOutput("missing data[0].embedding".to_string()))?;
    arr.iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| AiError::MalformedOutput("non-numeric embedding component".to_string())))
        .collect()
}
