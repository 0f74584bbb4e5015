//! Admin/Config Service (L15, SPEC_FULL §4.15).
//!
//! A typed reader over the relational config table providing per-provider
//! policy, the active embedding config, and object-storage credentials.
//! Grounded in `original_source/src/api/lib/{ai_extraction_config,
//! embedding_config, embedding_model_manager}.py` and
//! `original_source/operator/admin/manage_api_keys.py`: encrypted-table
//! first (AES-256-GCM, see `encryption`), environment fallback, then
//! hard-coded defaults (§4.3, §4.4).
//!
//! Hot-reload follows the teacher's "prepare new, then atomic swap" pattern
//! (`GraphEngine`'s `reload_if_changed`/`DashMap`): `reload()` re-reads the
//! relational table and swaps an `arc-swap` pointer so in-flight readers
//! never observe a half-updated config.

mod credentials;
mod embedding_config;
mod encryption;
mod provider_policy;
mod table;

pub use credentials::ObjectStorageCredentials;
pub use embedding_config::EmbeddingConfig;
pub use provider_policy::{ProviderPolicy, PROVIDER_DEFAULTS};

use arc_swap::ArcSwap;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("fatal configuration error: {0}")]
    Fatal(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Snapshot of everything the config service can answer, swapped atomically
/// on `reload()`.
#[derive(Debug, Clone, Default)]
struct ConfigSnapshot {
    provider_policies: std::collections::HashMap<String, ProviderPolicy>,
    embedding_config: Option<EmbeddingConfig>,
    object_storage_credentials: Option<ObjectStorageCredentials>,
}

/// Library-level config facade (not a CLI surface). Backed by a relational
/// `app_config` table; reads fall back to environment variables, then to
/// the hard defaults named in §4.4 / §6.
pub struct ConfigService {
    conn: Mutex<Connection>,
    snapshot: ArcSwap<ConfigSnapshot>,
}

impl ConfigService {
    pub fn open(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> ConfigResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ConfigResult<Self> {
        table::init_schema(&conn)?;
        let service = Self {
            conn: Mutex::new(conn),
            snapshot: ArcSwap::new(Arc::new(ConfigSnapshot::default())),
        };
        service.reload()?;
        Ok(service)
    }

    /// Re-read the relational table and atomically swap the snapshot.
    /// Outstanding readers holding the old `Arc<ConfigSnapshot>` keep seeing
    /// consistent (if stale) values until they re-read.
    pub fn reload(&self) -> ConfigResult<()> {
        let conn = self.conn.lock().unwrap();
        let provider_policies = table::load_provider_policies(&conn)?;
        let embedding_config = table::load_embedding_config(&conn)?;
        let object_storage_credentials = table::load_object_storage_credentials(&conn)?;
        drop(conn);

        self.snapshot.store(Arc::new(ConfigSnapshot {
            provider_policies,
            embedding_config,
            object_storage_credentials,
        }));
        Ok(())
    }

    pub fn set_provider_policy(&self, provider: &str, policy: ProviderPolicy) -> ConfigResult<()> {
        let conn = self.conn.lock().unwrap();
        table::save_provider_policy(&conn, provider, &policy)?;
        drop(conn);
        self.reload()
    }

    pub fn set_embedding_config(&self, config: EmbeddingConfig) -> ConfigResult<()> {
        let conn = self.conn.lock().unwrap();
        table::save_embedding_config(&conn, &config)?;
        drop(conn);
        self.reload()
    }

    pub fn set_object_storage_credentials(&self, creds: ObjectStorageCredentials) -> ConfigResult<()> {
        let conn = self.conn.lock().unwrap();
        table::save_object_storage_credentials(&conn, &creds)?;
        drop(conn);
        self.reload()
    }

    /// `get_provider_policy(provider) -> {max_concurrent, max_retries}`:
    /// relational row, else env override, else per-provider hard default.
    pub fn get_provider_policy(&self, provider: &str) -> ProviderPolicy {
        let snapshot = self.snapshot.load();
        if let Some(policy) = snapshot.provider_policies.get(provider) {
            return provider_policy::apply_env_overrides(provider, policy.clone());
        }
        let default = provider_policy::default_for(provider);
        provider_policy::apply_env_overrides(provider, default)
    }

    /// The active embedding model/dimension pair, used by L5's
    /// "only-incompatible" bulk-regenerate filter (§4.5).
    pub fn get_embedding_config(&self) -> EmbeddingConfig {
        self.snapshot
            .load()
            .embedding_config
            .clone()
            .unwrap_or_default()
    }

    /// Encrypted-table-first, environment fallback (§4.3).
    pub fn get_object_storage_credentials(&self) -> ConfigResult<ObjectStorageCredentials> {
        if let Some(creds) = self.snapshot.load().object_storage_credentials.clone() {
            return Ok(creds);
        }
        ObjectStorageCredentials::from_env()
            .ok_or_else(|| ConfigError::Fatal("no object storage credentials configured".into()))
    }

    /// `MAX_CONCURRENT_THREADS` hard upper bound (§6), default 32.
    pub fn max_concurrent_threads(&self) -> usize {
        std::env::var("MAX_CONCURRENT_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_provider_falls_back_to_hard_default() {
        let svc = ConfigService::open_in_memory().unwrap();
        let policy = svc.get_provider_policy("anthropic");
        assert_eq!(policy.max_concurrent, 4);
        assert_eq!(policy.max_retries, 8);
    }

    #[test]
    fn set_provider_policy_overrides_default() {
        let svc = ConfigService::open_in_memory().unwrap();
        svc.set_provider_policy("anthropic", ProviderPolicy { max_concurrent: 2, max_retries: 1 })
            .unwrap();
        let policy = svc.get_provider_policy("anthropic");
        assert_eq!(policy.max_concurrent, 2);
        assert_eq!(policy.max_retries, 1);
    }

    #[test]
    fn reload_picks_up_committed_changes() {
        let svc = ConfigService::open_in_memory().unwrap();
        svc.set_embedding_config(EmbeddingConfig { model: "nomic-embed-text-v1.5".into(), dimensions: 768 })
            .unwrap();
        let cfg = svc.get_embedding_config();
        assert_eq!(cfg.dimensions, 768);
    }

    #[test]
    fn missing_object_storage_credentials_is_fatal() {
        let svc = ConfigService::open_in_memory().unwrap();
        std::env::remove_var("OBJECT_STORE_ACCESS_KEY");
        std::env::remove_var("OBJECT_STORE_SECRET_KEY");
        std::env::remove_var("OBJECT_STORE_ENDPOINT");
        std::env::remove_var("OBJECT_STORE_BUCKET");
        assert!(svc.get_object_storage_credentials().is_err());
    }

    #[test]
    fn saving_credentials_without_encryption_key_is_fatal() {
        let svc = ConfigService::open_in_memory().unwrap();
        std::env::remove_var("ENCRYPTION_KEY");
        let creds = ObjectStorageCredentials {
            endpoint: "https://s3.example.com".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            bucket: "docs".into(),
        };
        assert!(matches!(svc.set_object_storage_credentials(creds), Err(ConfigError::Fatal(_))));
    }

    #[test]
    fn stored_credentials_round_trip_through_encryption() {
        std::env::set_var("ENCRYPTION_KEY", "a-test-master-key");
        let svc = ConfigService::open_in_memory().unwrap();
        let creds = ObjectStorageCredentials {
            endpoint: "https://s3.example.com".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            bucket: "docs".into(),
        };
        svc.set_object_storage_credentials(creds).unwrap();

        let loaded = svc.get_object_storage_credentials().unwrap();
        assert_eq!(loaded.bucket, "docs");
        assert_eq!(loaded.secret_key, "sk");
        std::env::remove_var("ENCRYPTION_KEY");
    }

    #[test]
    fn reopening_an_encrypted_table_without_the_key_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.sqlite");

        std::env::set_var("ENCRYPTION_KEY", "a-test-master-key");
        {
            let svc = ConfigService::open(&path).unwrap();
            svc.set_object_storage_credentials(ObjectStorageCredentials {
                endpoint: "https://s3.example.com".into(),
                access_key: "ak".into(),
                secret_key: "sk".into(),
                bucket: "docs".into(),
            })
            .unwrap();
        }

        std::env::remove_var("ENCRYPTION_KEY");
        assert!(ConfigService::open(&path).is_err());
    }
}
