//! Background maintenance for the response cache.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::key::CacheKey;
use super::ttl::TtlCache;
use crate::service::worker::BackgroundRunnable;

/// Work items accepted by [`CacheSweeper`].
#[derive(Debug)]
pub enum CacheTask {
    /// Drop every expired entry now instead of waiting for the next tick.
    PurgeExpired,
    /// Drop one entry regardless of expiry.
    Invalidate(CacheKey),
    /// Drop everything.
    Clear,
}

/// Purges expired cache entries on every tick of a [`BackgroundWorker`](crate::service::worker::BackgroundWorker).
pub struct CacheSweeper<V> {
    cache: Arc<TtlCache<V>>,
}

impl<V> CacheSweeper<V> {
    #[must_use]
    pub fn new(cache: Arc<TtlCache<V>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> BackgroundRunnable for CacheSweeper<V> {
    type Task = CacheTask;

    fn name(&self) -> &'static str {
        "cache-sweeper"
    }

    async fn run(&mut self, task: CacheTask) {
        match task {
            CacheTask::PurgeExpired => {
                let purged = self.cache.purge_expired();
                debug!(purged, "purged expired cache entries on request");
            }
            CacheTask::Invalidate(key) => {
                self.cache.invalidate(&key);
            }
            CacheTask::Clear => self.cache.clear(),
        }
    }

    async fn on_tick(&mut self) {
        let purged = self.cache.purge_expired();
        if purged > 0 {
            debug!(purged, remaining = self.cache.len(), "cache sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use opwatch_core::ManualClock;
    use serde_json::{json, Value};

    use super::*;
    use crate::cache::CacheConfig;
    use crate::service::worker::BackgroundWorker;

    fn setup() -> (Arc<ManualClock>, Arc<TtlCache<Value>>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(TtlCache::new(clock.clone(), &CacheConfig::default()));
        (clock, cache)
    }

    #[tokio::test]
    async fn tick_purges_expired_entries() {
        let (clock, cache) = setup();
        cache.put(CacheKey::derive("c", &json!(1)), json!(1), Duration::from_secs(1));
        cache.put(CacheKey::derive("c", &json!(2)), json!(2), Duration::from_secs(60));
        clock.advance(Duration::from_secs(5));

        let mut sweeper = CacheSweeper::new(cache.clone());
        sweeper.on_tick().await;
        assert_eq!(cache.len(), 1);
    }

    // Paused time only advances once every task is idle, so each sleep
    // returns after the worker has drained its queue.
    #[tokio::test(start_paused = true)]
    async fn tasks_are_applied_through_worker() {
        let (_clock, cache) = setup();
        let k1 = CacheKey::derive("c", &json!(1));
        let k2 = CacheKey::derive("c", &json!(2));
        cache.put(k1.clone(), json!(1), Duration::from_secs(60));
        cache.put(k2, json!(2), Duration::from_secs(60));

        let mut worker =
            BackgroundWorker::start(CacheSweeper::new(cache.clone()), Duration::from_secs(60));
        worker.submit(CacheTask::Invalidate(k1.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get(&k1).is_none());
        assert_eq!(cache.len(), 1);

        worker.submit(CacheTask::Clear).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_empty());

        worker.stop().await;
    }
}
