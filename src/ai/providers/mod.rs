//! Concrete `Extractor`/`Embedder`/`Vision` implementations.
//!
//! `http` wraps any OpenAI/Anthropic-shaped HTTP endpoint behind a
//! semaphore so concurrent ingestion workers never exceed the per-provider
//! `ProviderPolicy::max_concurrent` (config L15), generalizing the
//! teacher's `LlmOrcClient`/`SubprocessClient` (MCP subprocess transport)
//! to HTTP while keeping the same trait-object-behind-an-Arc shape.
//! `mock` stands in for both in unit tests, same role as the teacher's
//! `MockClient`.

pub mod http;
pub mod mock;
