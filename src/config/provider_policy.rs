//! Per-provider concurrency/retry policy (§4.4, §4.15), read by L4's
//! semaphore-gated AI provider clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderPolicy {
    pub max_concurrent: usize,
    pub max_retries: u32,
}

/// Hard defaults used when neither the config table nor the environment
/// names a provider.
pub const PROVIDER_DEFAULTS: &[(&str, ProviderPolicy)] = &[
    ("anthropic", ProviderPolicy { max_concurrent: 4, max_retries: 8 }),
    ("openai", ProviderPolicy { max_concurrent: 4, max_retries: 8 }),
    ("local", ProviderPolicy { max_concurrent: 1, max_retries: 2 }),
];

pub fn default_for(provider: &str) -> ProviderPolicy {
    PROVIDER_DEFAULTS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, policy)| *policy)
        .unwrap_or(ProviderPolicy { max_concurrent: 2, max_retries: 4 })
}

/// `{PROVIDER}_MAX_CONCURRENT` / `{PROVIDER}_MAX_RETRIES` env overrides,
/// named after the provider in uppercase (e.g. `ANTHROPIC_MAX_CONCURRENT`).
pub fn apply_env_overrides(provider: &str, mut policy: ProviderPolicy) -> ProviderPolicy {
    let prefix = provider.to_uppercase();
    if let Ok(v) = std::env::var(format!("{prefix}_MAX_CONCURRENT")) {
        if let Ok(n) = v.parse() {
            policy.max_concurrent = n;
        }
    }
    if let Ok(v) = std::env::var(format!("{prefix}_MAX_RETRIES")) {
        if let Ok(n) = v.parse() {
            policy.max_retries = n;
        }
    }
    policy
}
