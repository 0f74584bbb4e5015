//! Jittered exponential backoff retry wrapper for AI provider calls
//! (SPEC_FULL §4.4, §5). Grounded in the teacher's extraction coordinator
//! retry loop (examples/nrgforge-plexus/src/adapter/extraction.rs) but
//! generalized to any fallible future rather than MCP subprocess spawns.

use super::{AiError, AiResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 8, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Default::default() }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}

/// Retry `f` up to `policy.max_retries` times on transient errors
/// (`Transport`, `RateLimited`), returning `RetriesExhausted` if none
/// succeed. `MalformedOutput` and `Cancelled` are never retried: the
/// former is a provider bug the caller should surface, the latter means
/// the caller no longer wants this work done.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut f: F) -> AiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AiResult<T>>,
{
    let mut last_err = None;
    for attempt in 0..=policy.max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(AiError::Cancelled) => return Err(AiError::Cancelled),
            Err(AiError::MalformedOutput(msg)) => return Err(AiError::MalformedOutput(msg)),
            Err(err) => {
                last_err = Some(err);
                if attempt < policy.max_retries {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
    Err(AiError::RetriesExhausted(
        last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = with_retry(RetryPolicy::default(), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AiError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) };
        let result = with_retry(policy, move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AiError::Transport("timeout".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_output_is_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result: AiResult<()> = with_retry(RetryPolicy::default(), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AiError::MalformedOutput("bad json".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(AiError::MalformedOutput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_last_error() {
        let policy = RetryPolicy { max_retries: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2) };
        let result: AiResult<()> =
            with_retry(policy, || async { Err(AiError::Transport("down".into())) }).await;
        assert!(matches!(result, Err(AiError::RetriesExhausted(_))));
    }
}
