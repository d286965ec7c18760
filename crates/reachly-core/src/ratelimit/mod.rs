//! Rate limiting
//!
//! Fixed-window request counting per client identity. The algorithm is
//! decoupled from bucket storage through the `BucketStore` trait; the
//! shipped store is in-memory with opportunistic TTL eviction, which
//! bounds growth for single-instance deployments. Buckets are not shared
//! across instances.
//!
//! Accounting is two-phase so call sites can skip counting requests based
//! on how they turned out: `check` reserves a slot and returns a release
//! handle; `commit` with `should_count = false` gives the slot back. A
//! release that arrives after the bucket's window rotated is a no-op.

use reachly_common::config::RatePolicyConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// How often expired buckets are swept out of the in-memory store
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A named rate-limit policy
#[derive(Debug, Clone)]
pub struct RatePolicy {
    /// Window length
    pub window: Duration,
    /// Maximum requests per window
    pub max: u32,
    /// Do not count requests that ended in success (2xx)
    pub skip_successful: bool,
    /// Do not count requests that ended in failure (4xx/5xx)
    pub skip_failed: bool,
}

impl RatePolicy {
    /// Strict policy for authentication attempts: long window, very low
    /// max, counts only failures
    pub fn auth() -> Self {
        Self {
            window: Duration::from_secs(900),
            max: 5,
            skip_successful: true,
            skip_failed: false,
        }
    }

    /// Medium policy for outbound send actions
    pub fn send() -> Self {
        Self {
            window: Duration::from_secs(60),
            max: 30,
            skip_successful: false,
            skip_failed: false,
        }
    }

    /// Broad default policy for general API traffic
    pub fn api() -> Self {
        Self {
            window: Duration::from_secs(60),
            max: 120,
            skip_successful: false,
            skip_failed: false,
        }
    }

    /// Build a policy from its configuration table
    pub fn from_config(config: &RatePolicyConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max: config.max,
            skip_successful: config.skip_successful,
            skip_failed: config.skip_failed,
        }
    }
}

/// The outcome of a reservation, surfaced as X-RateLimit-* headers
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_after: Duration,
}

/// Release handle for a reserved slot
#[derive(Debug)]
pub struct Reservation {
    identity: String,
    window_started_at: Instant,
}

/// Storage seam for rate-limit buckets
pub trait BucketStore: Send + Sync {
    /// Reserve a slot for `identity`, rotating the bucket when its window
    /// has elapsed
    fn reserve(&self, identity: &str, policy: &RatePolicy, now: Instant)
        -> (Decision, Reservation);

    /// Give a reserved slot back; no-op when the bucket's window has
    /// since rotated
    fn release(&self, reservation: &Reservation);

    /// Inspect the current window without reserving
    fn peek(&self, identity: &str, policy: &RatePolicy, now: Instant) -> Decision;
}

struct Bucket {
    count: u32,
    window_started_at: Instant,
    reset_at: Instant,
}

struct Inner {
    buckets: HashMap<String, Bucket>,
    last_sweep: Instant,
}

/// In-memory fixed-window bucket store
pub struct MemoryBucketStore {
    inner: Mutex<Inner>,
}

impl MemoryBucketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buckets: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Number of identities currently tracked (diagnostics)
    pub fn len(&self) -> usize {
        self.lock().buckets.len()
    }

    /// Whether no identities are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic while holding it; the bucket map
        // is still structurally sound, so keep serving
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sweep(inner: &mut Inner, now: Instant) {
        if now.duration_since(inner.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        let before = inner.buckets.len();
        inner.buckets.retain(|_, bucket| bucket.reset_at > now);
        inner.last_sweep = now;
        debug!(
            evicted = before - inner.buckets.len(),
            tracked = inner.buckets.len(),
            "Swept expired rate-limit buckets"
        );
    }
}

impl Default for MemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketStore for MemoryBucketStore {
    fn reserve(
        &self,
        identity: &str,
        policy: &RatePolicy,
        now: Instant,
    ) -> (Decision, Reservation) {
        let mut inner = self.lock();
        Self::sweep(&mut inner, now);

        let bucket = inner
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| Bucket {
                count: 0,
                window_started_at: now,
                reset_at: now + policy.window,
            });

        // Expired windows are replaced wholesale, never decremented
        if now >= bucket.reset_at {
            bucket.count = 0;
            bucket.window_started_at = now;
            bucket.reset_at = now + policy.window;
        }

        bucket.count += 1;

        let decision = Decision {
            allowed: bucket.count <= policy.max,
            limit: policy.max,
            remaining: policy.max.saturating_sub(bucket.count),
            reset_after: bucket.reset_at.saturating_duration_since(now),
        };
        let reservation = Reservation {
            identity: identity.to_string(),
            window_started_at: bucket.window_started_at,
        };

        (decision, reservation)
    }

    fn release(&self, reservation: &Reservation) {
        let mut inner = self.lock();
        if let Some(bucket) = inner.buckets.get_mut(&reservation.identity) {
            if bucket.window_started_at == reservation.window_started_at && bucket.count > 0 {
                bucket.count -= 1;
            }
        }
    }

    fn peek(&self, identity: &str, policy: &RatePolicy, now: Instant) -> Decision {
        let inner = self.lock();
        match inner.buckets.get(identity) {
            Some(bucket) if now < bucket.reset_at => Decision {
                allowed: bucket.count < policy.max,
                limit: policy.max,
                remaining: policy.max.saturating_sub(bucket.count),
                reset_after: bucket.reset_at.saturating_duration_since(now),
            },
            _ => Decision {
                allowed: policy.max > 0,
                limit: policy.max,
                remaining: policy.max,
                reset_after: policy.window,
            },
        }
    }
}

/// Rate limiter over a pluggable bucket store
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
}

impl RateLimiter {
    /// Create a limiter over the in-memory store
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryBucketStore::new()),
        }
    }

    /// Create a limiter over a custom store
    pub fn with_store(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    /// Reserve a slot for `identity` under `policy`
    pub fn check(&self, identity: &str, policy: &RatePolicy) -> (Decision, Reservation) {
        self.check_at(identity, policy, Instant::now())
    }

    /// Reserve at an explicit instant
    pub fn check_at(
        &self,
        identity: &str,
        policy: &RatePolicy,
        now: Instant,
    ) -> (Decision, Reservation) {
        self.store.reserve(identity, policy, now)
    }

    /// Settle a reservation once the response status is known. Counting is
    /// the default; releasing gives the slot back for requests the policy
    /// says should not count.
    pub fn commit(&self, reservation: Reservation, should_count: bool) {
        if !should_count {
            self.store.release(&reservation);
        }
    }

    /// Inspect the current window without reserving
    pub fn peek(&self, identity: &str, policy: &RatePolicy) -> Decision {
        self.store.peek(identity, policy, Instant::now())
    }
}
