//! Object Storage Client (L3, SPEC_FULL §4.3): put/get/list/delete of
//! immutable blobs against an S3-compatible store, with content-addressed
//! keys for source documents and sanitized-ontology keys for images and
//! projection snapshots.
//!
//! The S3-compatible service itself is an external collaborator (§1
//! Non-goals); this module is the typed client against it, built with
//! `reqwest` the way `context-harness` (one of the other pack repos) talks
//! to its own HTTP backends, and `sha2` for the content-addressing scheme.

mod client;
mod content_type;
mod keys;

pub use client::{ObjectStorageClient, ObjectStorageError, ObjectStorageResult};
pub use content_type::detect_image_content_type;
pub use keys::{image_key, projection_history_key, projection_latest_key, sanitize_ontology, source_key};
