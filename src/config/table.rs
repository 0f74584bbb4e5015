//! Relational backing for [`super::ConfigService`]: a single `app_config`
//! key/value table, mirroring the teacher's `sqlite.rs` schema-init and
//! row-mapping style. Object storage credentials are stored AES-256-GCM
//! encrypted (`super::encryption`); every other row is plaintext JSON.

use super::encryption::{self, EncryptionKey};
use super::{ConfigResult, EmbeddingConfig, ObjectStorageCredentials, ProviderPolicy};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

const PROVIDER_POLICY_PREFIX: &str = "provider_policy:";
const EMBEDDING_CONFIG_KEY: &str = "embedding_config";
const OBJECT_STORAGE_CREDENTIALS_KEY: &str = "object_storage_credentials";

pub fn init_schema(conn: &Connection) -> ConfigResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn get(conn: &Connection, key: &str) -> ConfigResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM app_config WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

fn set(conn: &Connection, key: &str, value: &str) -> ConfigResult<()> {
    conn.execute(
        "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn load_provider_policies(conn: &Connection) -> ConfigResult<HashMap<String, ProviderPolicy>> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config WHERE key LIKE ?1")?;
    let pattern = format!("{PROVIDER_POLICY_PREFIX}%");
    let rows = stmt.query_map(params![pattern], |row| {
        let key: String = row.get(0)?;
        let value: String = row.get(1)?;
        Ok((key, value))
    })?;

    let mut out = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        let provider = key.trim_start_matches(PROVIDER_POLICY_PREFIX).to_string();
        let policy: ProviderPolicy = serde_json::from_str(&value)?;
        out.insert(provider, policy);
    }
    Ok(out)
}

pub fn save_provider_policy(conn: &Connection, provider: &str, policy: &ProviderPolicy) -> ConfigResult<()> {
    let key = format!("{PROVIDER_POLICY_PREFIX}{provider}");
    set(conn, &key, &serde_json::to_string(policy)?)
}

pub fn load_embedding_config(conn: &Connection) -> ConfigResult<Option<EmbeddingConfig>> {
    match get(conn, EMBEDDING_CONFIG_KEY)? {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

pub fn save_embedding_config(conn: &Connection, config: &EmbeddingConfig) -> ConfigResult<()> {
    set(conn, EMBEDDING_CONFIG_KEY, &serde_json::to_string(config)?)
}

/// Encrypted-table-first (§4.3): a present row requires `ENCRYPTION_KEY` to
/// decrypt; its absence is a fatal configuration error (§7), not a silent
/// fallback to the environment-variable credentials.
pub fn load_object_storage_credentials(conn: &Connection) -> ConfigResult<Option<ObjectStorageCredentials>> {
    match get(conn, OBJECT_STORAGE_CREDENTIALS_KEY)? {
        Some(encoded) => {
            let key = EncryptionKey::from_env()?;
            let plaintext = encryption::decrypt(&encoded, &key)?;
            Ok(Some(serde_json::from_slice(&plaintext)?))
        }
        None => Ok(None),
    }
}

pub fn save_object_storage_credentials(conn: &Connection, creds: &ObjectStorageCredentials) -> ConfigResult<()> {
    let key = EncryptionKey::from_env()?;
    let plaintext = serde_json::to_vec(creds)?;
    let encoded = encryption::encrypt(&plaintext, &key)?;
    set(conn, OBJECT_STORAGE_CREDENTIALS_KEY, &encoded)
}
