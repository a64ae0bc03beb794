//! In-memory token buckets keyed by caller identity and endpoint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::NetworkError;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-(caller, endpoint) token buckets on a monotonic clock.
///
/// Buckets refill continuously at the endpoint's per-minute rate and cap at
/// one minute's worth of requests. State is in-memory only; a restart simply
/// refills everyone.
pub struct RateLimiter {
    buckets: Mutex<HashMap<(String, &'static str), TokenBucket>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter {
    pub fn new() -> RateLimiter {
        RateLimiter::default()
    }

    /// Take one token for `key` on `endpoint`, or report `RateLimited`.
    ///
    /// `key` is the peer's node id for signed calls, the client IP
    /// otherwise.
    pub fn check(
        &self,
        key: &str,
        endpoint: &'static str,
        per_minute: u32,
    ) -> Result<(), NetworkError> {
        self.check_at(key, endpoint, per_minute, Instant::now())
    }

    fn check_at(
        &self,
        key: &str,
        endpoint: &'static str,
        per_minute: u32,
        now: Instant,
    ) -> Result<(), NetworkError> {
        let mut buckets = self.buckets.lock().expect("rate bucket lock poisoned");
        let bucket = buckets
            .entry((key.to_string(), endpoint))
            .or_insert(TokenBucket {
                tokens: per_minute as f64,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * per_minute as f64 / 60.0).min(per_minute as f64);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            metrics::counter!("network.rate_limited", 1);
            return Err(NetworkError::RateLimited);
        }
        bucket.tokens -= 1.0;
        Ok(())
    }
}
