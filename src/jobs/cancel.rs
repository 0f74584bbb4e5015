//! Cooperative cancellation, grounded verbatim in the teacher's
//! `adapter::cancel::CancellationToken`: the framework signals, the worker
//! checks between units of work, already-committed work stays committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `duration`, but wake early and return if `token` is cancelled
/// mid-wait (§5: "rate-limiter backoff sleeps are cancellation-aware").
pub async fn sleep_cancellable(duration: std::time::Duration, token: &CancellationToken) {
    const STEP: std::time::Duration = std::time::Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > std::time::Duration::ZERO {
        if token.is_cancelled() {
            return;
        }
        let wait = STEP.min(remaining);
        tokio::time::sleep(wait).await;
        remaining = remaining.saturating_sub(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_sets_token() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cloned_token_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn sleep_cancellable_returns_early_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let start = std::time::Instant::now();
        sleep_cancellable(std::time::Duration::from_secs(5), &token).await;
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }
}
