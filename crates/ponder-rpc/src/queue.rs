//! Request dispatch: combines rate limiting, retry-with-backoff, a
//! concurrency cap, and `eth_getLogs` range splitting behind one call site
//! so fetchers never have to reimplement failure policy.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::RpcError;
use crate::policy::{RateLimiter, RateLimiterConfig, RetryConfig, RetryPolicy};

pub struct RequestQueueConfig {
    pub rate_limiter: RateLimiterConfig,
    pub retry: RetryConfig,
    pub max_concurrent_requests: usize,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self {
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            max_concurrent_requests: 10,
        }
    }
}

/// Gatekeeper for all outbound RPC calls on a network: rate-limits, retries
/// transient failures with backoff, and caps in-flight request count.
pub struct RequestQueue {
    limiter: RateLimiter,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl RequestQueue {
    pub fn new(config: RequestQueueConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limiter),
            retry: RetryPolicy::new(config.retry),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        }
    }

    /// Run `op`, retrying transient `RpcError`s per the configured policy.
    /// Acquires a rate-limit token and a concurrency permit before each
    /// attempt.
    pub async fn dispatch<T, F, Fut>(&self, mut op: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut attempt = 1;
        loop {
            let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
            self.limiter.acquire().await;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self
                        .retry
                        .next_delay(attempt)
                        .expect("should_retry implies next_delay is Some");
                    tracing::warn!(attempt, ?delay, error = %e, "retrying RPC request");
                    drop(_permit);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Split `[from, to]` into chunks no larger than `max_range`, in ascending
/// order. Empty if `to < from`.
pub fn split_log_range(from: u64, to: u64, max_range: u64) -> Vec<(u64, u64)> {
    if to < from {
        return Vec::new();
    }
    if to - from < max_range {
        return vec![(from, to)];
    }
    let mut chunks = Vec::new();
    let mut start = from;
    loop {
        let end = (start + max_range).min(to);
        chunks.push((start, end));
        if end == to {
            break;
        }
        start = end + 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn split_log_range_single_chunk_when_within_max() {
        assert_eq!(split_log_range(100, 150, 2000), vec![(100, 150)]);
    }

    #[test]
    fn split_log_range_splits_large_ranges() {
        let chunks = split_log_range(0, 4999, 2000);
        assert_eq!(chunks, vec![(0, 1999), (2000, 3999), (4000, 4999)]);
    }

    #[test]
    fn split_log_range_empty_when_inverted() {
        assert_eq!(split_log_range(10, 5, 2000), Vec::new());
    }

    #[tokio::test]
    async fn dispatch_retries_transient_then_succeeds() {
        let queue = RequestQueue::new(RequestQueueConfig {
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff: std::time::Duration::from_millis(1),
                max_backoff: std::time::Duration::from_millis(5),
                multiplier: 1.0,
                jitter_fraction: 0.0,
            },
            ..RequestQueueConfig::default()
        });
        let attempts = AtomicU32::new(0);
        let result = queue
            .dispatch(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RpcError::Transient("timeout".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_does_not_retry_permanent_errors() {
        let queue = RequestQueue::new(RequestQueueConfig::default());
        let attempts = AtomicU32::new(0);
        let result: Result<(), RpcError> = queue
            .dispatch(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(RpcError::Permanent("bad request".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
