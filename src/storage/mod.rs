//! Graph store client (L1, SPEC_FULL §4.1).
//!
//! Storage backends implement the `GraphStore` trait. `SqliteStore` is the
//! primary persistent implementation; `SqliteVecStore` (behind the
//! `embeddings` feature) adds a vec0-backed nearest-neighbor index
//! alongside it.

mod sqlite;
#[cfg(feature = "embeddings")]
mod sqlite_vec;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{EdgeFilter, GraphStore, NodeFilter, OpenStore, StorageError, StorageResult, Subgraph};
#[cfg(feature = "embeddings")]
pub use sqlite_vec::{SqliteVecStore, DEFAULT_EMBEDDING_DIMENSIONS};
