//! The facade's in-process audit log (§4.2): `{total, safe, raw,
//! safety_ratio}`, asserted against in tests and surfaced as an
//! operational metric.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditSnapshot {
    pub total: u64,
    pub safe: u64,
    pub raw: u64,
}

impl AuditSnapshot {
    pub fn safety_ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.safe as f64 / self.total as f64
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    safe: AtomicU64,
    raw: AtomicU64,
    last_query: std::sync::Mutex<Option<String>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_safe(&self) {
        self.safe.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_raw(&self) {
        self.raw.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a safe (namespace-qualified) call along with the emitted
    /// query text, so Testable Property 8 can assert the text names a label.
    pub fn record_safe_query(&self, query: &str) {
        self.record_safe();
        *self.last_query.lock().unwrap() = Some(query.to_string());
    }

    /// Records an `execute_raw` call along with the emitted query text.
    pub fn record_raw_query(&self, query: &str) {
        self.record_raw();
        *self.last_query.lock().unwrap() = Some(query.to_string());
    }

    /// The most recently emitted query text, for tests.
    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> AuditSnapshot {
        let safe = self.safe.load(Ordering::Relaxed);
        let raw = self.raw.load(Ordering::Relaxed);
        AuditSnapshot { total: safe + raw, safe, raw }
    }
}
