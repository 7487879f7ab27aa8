//! Two-tier cache: the local engine (L1) in front of a shared remote store (L2).
//!
//! ## Lookup Order
//!
//! 1. L1, microsecond latency
//! 2. L2 when the remote tier is considered available
//! 3. miss
//!
//! An L2 hit is copied into L1 with its original creation time, so a warmed
//! entry keeps serving locally after the remote tier goes away.
//!
//! ## Degradation
//!
//! A failed remote call marks the tier degraded for one health check
//! interval. While degraded every operation is local-only; once the window
//! has passed the next call retries the remote tier, and the background
//! health task flips availability back as soon as a ping succeeds.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::config::RedisConfig;
use crate::entry::{CacheEntry, CachedResponse, DistributedCacheEntry, ResponseSource};
use crate::key::CacheKey;
use crate::local::{LocalCache, LocalStats};
use crate::metrics;
use crate::remote::{EnforceReport, RemoteLookup, RemoteStats, RemoteStore};

/// L1 + L2 cache handle. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct HybridCache {
    inner: Arc<HybridInner>,
}

struct HybridInner {
    local: LocalCache,
    remote: Arc<dyn RemoteStore>,
    node_id: String,
    remote_ttl: Duration,
    health_check_interval: Duration,
    enforce_interval: Duration,
    remote_available: AtomicBool,
    degraded_until: Mutex<Option<Instant>>,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    remote_write_failures: AtomicU64,
    task: Mutex<Option<HealthTask>>,
}

struct HealthTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Snapshot of both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct HybridStats {
    pub node_id: String,
    pub remote_available: bool,
    /// Seconds left in the current degrade window
    pub degraded_for_secs: Option<u64>,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub remote_write_failures: u64,
    /// Percentage of lookups served by either tier
    pub hit_rate: f64,
    pub local: LocalStats,
    pub remote: RemoteStats,
}

impl HybridCache {
    pub fn new(
        local: LocalCache,
        remote: Arc<dyn RemoteStore>,
        config: &RedisConfig,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(HybridInner {
                local,
                remote,
                node_id: node_id.into(),
                remote_ttl: config.ttl(),
                health_check_interval: config.health_check_interval(),
                enforce_interval: config.enforce_interval(),
                remote_available: AtomicBool::new(true),
                degraded_until: Mutex::new(None),
                l2_hits: AtomicU64::new(0),
                l2_misses: AtomicU64::new(0),
                remote_write_failures: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn local(&self) -> &LocalCache {
        &self.inner.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn is_remote_available(&self) -> bool {
        self.inner.remote_available.load(Ordering::Relaxed)
    }

    /// Whether the next operation should talk to the remote tier.
    fn remote_usable(&self) -> bool {
        if self.is_remote_available() {
            return true;
        }
        match *self.inner.degraded_until.lock() {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    fn mark_available(&self) {
        let was_available = self.inner.remote_available.swap(true, Ordering::Relaxed);
        *self.inner.degraded_until.lock() = None;
        if !was_available {
            metrics::set_remote_available(true);
            tracing::info!(backend = self.inner.remote.name(), "remote cache tier recovered");
        }
    }

    fn mark_degraded(&self) {
        let was_available = self.inner.remote_available.swap(false, Ordering::Relaxed);
        *self.inner.degraded_until.lock() = Some(Instant::now() + self.inner.health_check_interval);
        if was_available {
            metrics::set_remote_available(false);
            tracing::warn!(
                backend = self.inner.remote.name(),
                retry_in_secs = self.inner.health_check_interval.as_secs(),
                "remote cache tier unavailable, continuing local-only"
            );
        }
    }

    /// Look `key` up in L1, then L2.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        if let Some(hit) = self.inner.local.get(key) {
            return Some(hit);
        }
        if !self.remote_usable() {
            return None;
        }

        match self.inner.remote.get(key).await {
            RemoteLookup::Hit(record) => {
                self.mark_available();
                if record.is_expired(self.inner.remote_ttl) {
                    self.inner.l2_misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "expired remote record dropped");
                    self.inner.remote.delete(key).await;
                    return None;
                }

                self.inner.l2_hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_hit("L2");
                tracing::debug!(key = %key, origin = %record.node_id, "cache hit (L2)");

                let entry = record.into_entry();
                let response = entry.to_response();
                if entry.is_expired(self.inner.local.ttl()) {
                    // Older than the local TTL: serve it but do not warm L1
                    return Some(response);
                }
                self.inner.local.insert_entry(key.clone(), entry);
                Some(response)
            }
            RemoteLookup::Miss => {
                self.mark_available();
                self.inner.l2_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            RemoteLookup::Unavailable => {
                self.mark_degraded();
                None
            }
        }
    }

    /// Write to L1, then through to L2 when it is available.
    pub async fn set(&self, key: CacheKey, value: impl Into<String>, source: ResponseSource) {
        let entry = CacheEntry::new(value, source);
        let record = DistributedCacheEntry::from_entry(&entry, self.inner.node_id.as_str());
        self.inner.local.insert_entry(key.clone(), entry);

        if !self.remote_usable() {
            return;
        }
        if self
            .inner
            .remote
            .set(&key, &record, self.inner.remote_ttl)
            .await
        {
            self.mark_available();
        } else {
            self.inner.remote_write_failures.fetch_add(1, Ordering::Relaxed);
            self.mark_degraded();
        }
    }

    /// Remove `key` from both tiers. Returns whether either tier held it.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let local = self.inner.local.delete(key);
        if !self.remote_usable() {
            return local;
        }
        let remote = self.inner.remote.delete(key).await;
        local || remote
    }

    /// Empty L1 and, best-effort, this cache's namespace in L2.
    pub async fn clear(&self) {
        self.inner.local.clear();
        if self.remote_usable() && !self.inner.remote.clear().await {
            self.mark_degraded();
        }
    }

    /// Ping the remote tier and update availability.
    pub async fn check_health(&self) -> bool {
        let healthy = self.inner.remote.ping().await;
        if healthy {
            self.mark_available();
        } else {
            self.mark_degraded();
        }
        healthy
    }

    /// Apply the remote tier's limits. Skipped while the tier is degraded.
    pub async fn enforce_remote_limits(&self) -> Option<EnforceReport> {
        if !self.is_remote_available() {
            return None;
        }
        Some(self.inner.remote.enforce_limits().await)
    }

    /// Start the local tasks plus the remote health and enforcement loop.
    pub fn start_background_tasks(&self) {
        self.inner.local.start_background_tasks();

        let mut task = self.inner.task.lock();
        if task.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_health_loop(
            Arc::downgrade(&self.inner),
            self.inner.health_check_interval,
            self.inner.enforce_interval,
            shutdown_rx,
        );
        tracing::info!(
            node_id = %self.inner.node_id,
            health_check_interval_secs = self.inner.health_check_interval.as_secs(),
            enforce_interval_secs = self.inner.enforce_interval.as_secs(),
            "hybrid cache background tasks started"
        );
        *task = Some(HealthTask {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Stop all background tasks and wait for them.
    pub async fn shutdown(&self) {
        self.inner.local.shutdown().await;

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "remote health task ended abnormally");
            }
        }
    }

    pub async fn stats(&self) -> HybridStats {
        let local = self.inner.local.stats();
        let remote = if self.remote_usable() {
            self.inner.remote.stats().await
        } else {
            self.inner.remote.snapshot()
        };

        let l2_hits = self.inner.l2_hits.load(Ordering::Relaxed);
        let lookups = local.hits + local.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (local.hits + l2_hits) as f64 / lookups as f64 * 100.0
        };
        let degraded_for_secs = (*self.inner.degraded_until.lock())
            .map(|until| until.saturating_duration_since(Instant::now()).as_secs());

        HybridStats {
            node_id: self.inner.node_id.clone(),
            remote_available: self.is_remote_available(),
            degraded_for_secs,
            l2_hits,
            l2_misses: self.inner.l2_misses.load(Ordering::Relaxed),
            remote_write_failures: self.inner.remote_write_failures.load(Ordering::Relaxed),
            hit_rate,
            local,
            remote,
        }
    }
}

fn spawn_health_loop(
    cache: Weak<HybridInner>,
    health_every: Duration,
    enforce_every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut health = interval(health_every);
        let mut enforce = interval(enforce_every);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        enforce.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Both fire immediately; startup already pinged.
        health.tick().await;
        enforce.tick().await;

        loop {
            tokio::select! {
                _ = health.tick() => {
                    let Some(inner) = cache.upgrade() else {
                        break;
                    };
                    HybridCache { inner }.check_health().await;
                }
                _ = enforce.tick() => {
                    let Some(inner) = cache.upgrade() else {
                        break;
                    };
                    HybridCache { inner }.enforce_remote_limits().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("remote health task exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// A remote tier that is always down and counts how often it was asked.
    #[derive(Default)]
    struct DownStore {
        calls: AtomicUsize,
    }

    impl DownStore {
        fn called(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RemoteStore for DownStore {
        async fn get(&self, _key: &CacheKey) -> RemoteLookup {
            self.called();
            RemoteLookup::Unavailable
        }
        async fn set(&self, _key: &CacheKey, _entry: &DistributedCacheEntry, _ttl: Duration) -> bool {
            self.called();
            false
        }
        async fn delete(&self, _key: &CacheKey) -> bool {
            self.called();
            false
        }
        async fn clear(&self) -> bool {
            self.called();
            false
        }
        async fn keys(&self) -> Vec<CacheKey> {
            Vec::new()
        }
        async fn size(&self) -> Option<usize> {
            None
        }
        async fn memory_usage(&self) -> Option<u64> {
            None
        }
        async fn ping(&self) -> bool {
            self.called();
            false
        }
        async fn enforce_limits(&self) -> EnforceReport {
            EnforceReport::default()
        }
        async fn stats(&self) -> RemoteStats {
            self.snapshot()
        }
        fn snapshot(&self) -> RemoteStats {
            RemoteStats {
                backend: "down",
                ..Default::default()
            }
        }
        fn name(&self) -> &'static str {
            "down"
        }
    }

    fn hybrid(store: Arc<DownStore>, health_secs: u64) -> HybridCache {
        let redis = RedisConfig {
            health_check_interval_secs: health_secs,
            ..Default::default()
        };
        HybridCache::new(LocalCache::new(&CacheConfig::default()), store, &redis, "node-test")
    }

    #[tokio::test]
    async fn failed_write_degrades_until_window_passes() {
        let store = Arc::new(DownStore::default());
        let cache = hybrid(store.clone(), 60);

        cache.set(CacheKey::from_raw("a"), "1", ResponseSource::Model).await;
        assert!(!cache.is_remote_available());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        // Inside the window the remote tier is not contacted.
        cache.set(CacheKey::from_raw("b"), "2", ResponseSource::Model).await;
        assert!(cache.get(&CacheKey::from_raw("missing")).await.is_none());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        // Local tier keeps serving.
        assert!(cache.get(&CacheKey::from_raw("b")).await.is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.remote_write_failures, 1);
        assert!(!stats.remote_available);
        assert!(stats.degraded_for_secs.is_some());
    }

    #[tokio::test]
    async fn retries_after_window_elapses() {
        let store = Arc::new(DownStore::default());
        let cache = hybrid(store.clone(), 0);

        cache.set(CacheKey::from_raw("a"), "1", ResponseSource::Model).await;
        cache.set(CacheKey::from_raw("b"), "2", ResponseSource::Model).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn health_check_flips_availability() {
        let store = Arc::new(DownStore::default());
        let cache = hybrid(store, 30);

        assert!(cache.is_remote_available());
        assert!(!cache.check_health().await);
        assert!(!cache.is_remote_available());
        assert!(cache.enforce_remote_limits().await.is_none());
    }
}
