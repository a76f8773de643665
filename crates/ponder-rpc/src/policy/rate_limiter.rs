//! Token-bucket rate limiting for outbound RPC calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub capacity: f64,
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 300.0,
            refill_rate: 300.0,
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket. `try_acquire` never blocks; callers that need to
/// wait should sleep for `wait_time` and retry.
pub struct TokenBucket {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        let tokens = config.capacity;
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.refill_rate).min(self.config.capacity);
        state.last_refill = now;
    }

    pub fn try_acquire(&self, cost: f64) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    pub fn wait_time(&self, cost: f64) -> Duration {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        if state.tokens >= cost {
            return Duration::ZERO;
        }
        let deficit = cost - state.tokens;
        Duration::from_secs_f64(deficit / self.config.refill_rate)
    }

    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        state.tokens
    }
}

/// Per-network rate limiter; wraps a `TokenBucket` with a default request
/// cost so callers rarely need to think about token units.
pub struct RateLimiter {
    bucket: TokenBucket,
    default_cost: f64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config),
            default_cost: 1.0,
        }
    }

    pub fn with_default_cost(mut self, cost: f64) -> Self {
        self.default_cost = cost;
        self
    }

    pub fn try_acquire(&self) -> bool {
        self.bucket.try_acquire(self.default_cost)
    }

    pub fn try_acquire_cost(&self, cost: f64) -> bool {
        self.bucket.try_acquire(cost)
    }

    pub fn wait_time(&self) -> Duration {
        self.bucket.wait_time(self.default_cost)
    }

    /// Async-friendly acquire: sleeps until a token is available.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            tokio::time::sleep(self.wait_time()).await;
        }
    }
}
