//! Object storage credentials (§4.3, §4.15): encrypted-table-first with an
//! environment-variable fallback so local/dev runs don't need a populated
//! config table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageCredentials {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

impl ObjectStorageCredentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            endpoint: std::env::var("OBJECT_STORE_ENDPOINT").ok()?,
            access_key: std::env::var("OBJECT_STORE_ACCESS_KEY").ok()?,
            secret_key: std::env::var("OBJECT_STORE_SECRET_KEY").ok()?,
            bucket: std::env::var("OBJECT_STORE_BUCKET").ok()?,
        })
    }
}
