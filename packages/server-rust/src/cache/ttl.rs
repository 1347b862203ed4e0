//! In-memory response cache with per-entry expiry.
//!
//! Expiry is lazy: a read that finds an expired entry treats it as a miss and
//! evicts it on the spot. [`TtlCache::purge_expired`] exists for the periodic
//! sweeper and is never required for correctness.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use opwatch_core::ClockSource;
use tracing::trace;

use super::key::CacheKey;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Optional bound on the number of entries. `None` means unbounded.
    ///
    /// When the bound is hit, expired entries are purged first, then the
    /// entry closest to expiry is evicted.
    pub max_entries: Option<usize>,
    /// Interval between background sweeps of expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at_ms: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Concurrent key/value cache with per-entry TTL, backed by [`DashMap`].
///
/// Reads and writes are atomic per key; concurrent writers to the same key
/// resolve last-write-wins.
pub struct TtlCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    clock: Arc<dyn ClockSource>,
    max_entries: Option<usize>,
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn ClockSource>, config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_entries: config.max_entries,
        }
    }

    /// Returns the live value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            None => {
                metrics::counter!("opwatch_cache_misses_total").increment(1);
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                metrics::counter!("opwatch_cache_hits_total").increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            trace!(key = %key, "evicted expired cache entry");
            metrics::counter!("opwatch_cache_evictions_total", "reason" => "expired").increment(1);
        }
        metrics::counter!("opwatch_cache_misses_total").increment(1);
        None
    }

    /// Stores `value` under `key` for `ttl`, replacing any existing entry.
    pub fn put(&self, key: CacheKey, value: V, ttl: Duration) {
        let now = self.clock.now();
        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(&key) && self.entries.len() >= max {
                self.make_room(max, now);
            }
        }

        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at_ms: now.saturating_add(ttl_ms),
            },
        );
    }

    /// Removes `key` regardless of expiry. Returns `true` if an entry was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Removes all expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        if purged > 0 {
            metrics::counter!("opwatch_cache_evictions_total", "reason" => "expired")
                .increment(purged as u64);
        }
        purged
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self, max: usize, now: u64) {
        self.purge_expired();
        if self.entries.len() < max {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at_ms)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            trace!(key = %key, now, "evicted cache entry to stay within capacity");
            metrics::counter!("opwatch_cache_evictions_total", "reason" => "capacity").increment(1);
        }
    }
}
