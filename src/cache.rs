//! TTL cache layer over a [`KvStore`].
//!
//! Responsibilities beyond plain get/put:
//!
//! - **Read-path expiry** — an entry whose `expires_at_ms` has passed is a
//!   miss even if still physically present. Expired entries are not deleted
//!   on read; that is the store's own job.
//! - **Numeric normalization** — every monetary value crosses the store
//!   boundary as integer microdollars and every token count as `u64`, so
//!   values round-trip exactly regardless of what the store's serialization
//!   does to floats.
//! - **Degradation** — an unreachable store turns every operation into a
//!   miss/no-op with a warning. Caching is an optimization, not a
//!   correctness dependency.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fingerprint::short;
use crate::kv::KvStore;

/// Millisecond wall-clock source. Injected so tests can control expiry.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Production clock backed by `chrono::Utc`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Controllable clock for tests.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self(AtomicI64::new(start_ms))
    }

    pub fn advance_ms(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Persisted form of a generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub documentation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Cost in integer microdollars; see [`to_microdollars`].
    pub cost_microdollars: u64,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl CacheEntry {
    /// The originally billed cost, in dollars.
    pub fn cost(&self) -> f64 {
        self.cost_microdollars as f64 / 1_000_000.0
    }
}

/// Normalize a dollar amount to integer microdollars for storage.
pub fn to_microdollars(cost: f64) -> u64 {
    (cost * 1_000_000.0).round().max(0.0) as u64
}

/// Cache of generation results keyed by content fingerprint.
pub struct CacheLayer {
    store: Arc<dyn KvStore>,
    ttl_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KvStore>, ttl_seconds: u64) -> Self {
        Self::with_clock(store, ttl_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KvStore>, ttl_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ttl_seconds,
            clock,
        }
    }

    /// Look up an unexpired entry by fingerprint.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = short(key), "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = short(key), error = %e, "cache store unreachable; treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = short(key), error = %e, "corrupt cache entry; treating as miss");
                return None;
            }
        };

        // Expired entries are a miss; deletion is left to the store's own
        // expiration so the read path stays write-free.
        if entry.expires_at_ms <= self.clock.now_ms() {
            debug!(key = short(key), "cache entry expired");
            return None;
        }

        debug!(key = short(key), "cache hit");
        Some(entry)
    }

    /// Write a generation result under `key`, unconditionally overwriting
    /// any prior entry and resetting the TTL. Store failures are logged and
    /// swallowed.
    pub async fn put(&self, key: &str, documentation: &str, input_tokens: u64, output_tokens: u64, cost: f64) {
        let now_ms = self.clock.now_ms();
        let entry = CacheEntry {
            documentation: documentation.to_string(),
            input_tokens,
            output_tokens,
            cost_microdollars: to_microdollars(cost),
            created_at_ms: now_ms,
            expires_at_ms: now_ms + (self.ttl_seconds as i64) * 1000,
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = short(key), error = %e, "failed to serialize cache entry");
                return;
            }
        };

        if let Err(e) = self.store.put(key, bytes, self.ttl_seconds).await {
            warn!(key = short(key), error = %e, "cache write failed; continuing without cache");
        }
    }
}
