use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use super::autoscale::{
    AutoScalePolicy, AutoScaleStats, MemoryPressureProbe, ProcMeminfoProbe, ScaleDecision,
};
use super::policy::EvictionPolicy;
use super::store::{EvictionCause, EvictionCounts, Lookup, Store};
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, CachedResponse, ResponseSource};
use crate::key::CacheKey;
use crate::metrics;

/// Bounded, thread-safe in-process cache (the L1 tier).
///
/// All mutations, including touch-on-read, go through one mutex shared with
/// the background sweeper and auto-scaler. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct LocalCache {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    store: Mutex<Store>,
    ttl: Duration,
    policy: EvictionPolicy,
    cleanup_interval: Duration,
    auto_scale_interval: Duration,
    auto_scale: Option<AutoScalePolicy>,
    scaling: Mutex<AutoScaleStats>,
    probe: Arc<dyn MemoryPressureProbe>,
    hits: AtomicU64,
    misses: AtomicU64,
    tasks: Mutex<Option<BackgroundTasks>>,
}

struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Snapshot of the local tier.
#[derive(Debug, Clone, Serialize)]
pub struct LocalStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups served from cache
    pub hit_rate: f64,
    pub memory_bytes: usize,
    pub memory_mb: f64,
    pub max_memory_bytes: usize,
    pub memory_percent: f64,
    pub policy: EvictionPolicy,
    pub ttl_secs: u64,
    pub evictions: EvictionCounts,
    pub auto_scale: AutoScaleStats,
}

impl LocalCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_probe(config, Arc::new(ProcMeminfoProbe))
    }

    /// Build with a custom system memory probe for auto-scaling.
    pub fn with_probe(config: &CacheConfig, probe: Arc<dyn MemoryPressureProbe>) -> Self {
        let auto_scale = config
            .auto_scale
            .then(|| AutoScalePolicy::from_config(config));
        let scaling = AutoScaleStats {
            enabled: config.auto_scale,
            original_max_entries: config.max_entries,
            current_max_entries: config.max_entries,
            ceiling: if config.auto_scale {
                config.auto_scale_ceiling()
            } else {
                config.max_entries
            },
            ..Default::default()
        };
        Self {
            inner: Arc::new(LocalInner {
                store: Mutex::new(Store::new(
                    config.eviction_policy,
                    config.max_entries,
                    config.max_memory_bytes(),
                    config.memory_target_ratio,
                )),
                ttl: config.ttl(),
                policy: config.eviction_policy,
                cleanup_interval: config.cleanup_interval(),
                auto_scale_interval: config.auto_scale_interval(),
                auto_scale,
                scaling: Mutex::new(scaling),
                probe,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                tasks: Mutex::new(None),
            }),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.inner.policy
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Return the cached response for `key`, or `None` on a miss.
    ///
    /// Expired entries are removed here and count as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let lookup = self.inner.store.lock().get(key, self.inner.ttl);
        match lookup {
            Lookup::Hit(response) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_hit("L1");
                tracing::trace!(key = %key, "cache hit (L1)");
                Some(response)
            }
            Lookup::Expired => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_evictions(EvictionCause::Expired.as_str(), 1);
                metrics::record_cache_miss();
                tracing::debug!(key = %key, "expired entry dropped on access");
                None
            }
            Lookup::Missing => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_miss();
                None
            }
        }
    }

    pub fn set(&self, key: CacheKey, value: impl Into<String>, source: ResponseSource) {
        self.insert_entry(key, CacheEntry::new(value, source));
    }

    /// Insert a prebuilt entry, keeping its timestamps and access count.
    pub fn insert_entry(&self, key: CacheKey, entry: CacheEntry) {
        let (outcome, len, memory, max_entries) = {
            let mut store = self.inner.store.lock();
            let outcome = store.insert(key.clone(), entry);
            (outcome, store.len(), store.memory_bytes(), store.max_entries())
        };

        if outcome.rejected {
            tracing::warn!(key = %key, "entry exceeds the memory budget on its own, not cached");
        }
        if outcome.evicted_by_count > 0 || outcome.evicted_by_memory > 0 {
            tracing::debug!(
                key = %key,
                by_count = outcome.evicted_by_count,
                by_memory = outcome.evicted_by_memory,
                "evicted entries to make room"
            );
        }
        metrics::record_evictions(EvictionCause::CountLimit.as_str(), outcome.evicted_by_count);
        metrics::record_evictions(EvictionCause::MemoryLimit.as_str(), outcome.evicted_by_memory);
        metrics::set_local_usage(len, memory, max_entries);
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        self.inner.store.lock().remove(key).is_some()
    }

    /// Whether `key` holds a live entry. Does not count as an access.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.store.lock().contains(key, self.inner.ttl)
    }

    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.inner.store.lock().max_entries()
    }

    /// Drop every entry. Calling it again is a no-op.
    pub fn clear(&self) {
        let removed = self.inner.store.lock().clear();
        if removed > 0 {
            tracing::info!(removed, "cleared local cache");
        }
        metrics::set_local_usage(0, 0, self.max_entries());
    }

    /// One expiry sweep. Returns how many entries were removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.inner.store.lock().purge_expired(self.inner.ttl);
        if removed > 0 {
            tracing::debug!(removed, "swept expired entries");
            metrics::record_evictions(EvictionCause::Expired.as_str(), removed);
        }
        removed
    }

    /// One auto-scale evaluation. `Hold` when auto-scaling is disabled.
    pub fn run_auto_scale(&self) -> ScaleDecision {
        let Some(policy) = &self.inner.auto_scale else {
            return ScaleDecision::Hold;
        };
        let system_used = self.inner.probe.used_ratio();

        let decision = {
            let mut store = self.inner.store.lock();
            let memory_ratio = store.memory_bytes() as f64 / store.max_memory_bytes().max(1) as f64;
            let decision = policy.decide(store.max_entries(), store.len(), memory_ratio, system_used);
            match decision {
                ScaleDecision::Grow { to, .. } | ScaleDecision::Shrink { to, .. } => {
                    store.set_max_entries(to);
                }
                ScaleDecision::Hold => {}
            }
            decision
        };

        let mut scaling = self.inner.scaling.lock();
        match decision {
            ScaleDecision::Grow { from, to } => {
                scaling.scale_ups += 1;
                scaling.current_max_entries = to;
                tracing::info!(from, to, "auto-scale: growing local cache");
            }
            ScaleDecision::Shrink { from, to } => {
                scaling.scale_downs += 1;
                scaling.current_max_entries = to;
                tracing::info!(from, to, "auto-scale: shrinking local cache");
            }
            ScaleDecision::Hold => {}
        }
        scaling.last_decision = Some(decision);
        decision
    }

    pub fn stats(&self) -> LocalStats {
        let (entries, max_entries, memory_bytes, max_memory_bytes, evictions) = {
            let store = self.inner.store.lock();
            (
                store.len(),
                store.max_entries(),
                store.memory_bytes(),
                store.max_memory_bytes(),
                store.evictions(),
            )
        };
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let mut auto_scale = self.inner.scaling.lock().clone();
        auto_scale.current_max_entries = max_entries;

        LocalStats {
            entries,
            max_entries,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64 * 100.0
            },
            memory_bytes,
            memory_mb: memory_bytes as f64 / (1024.0 * 1024.0),
            max_memory_bytes,
            memory_percent: memory_bytes as f64 / max_memory_bytes.max(1) as f64 * 100.0,
            policy: self.inner.policy,
            ttl_secs: self.inner.ttl.as_secs(),
            evictions,
            auto_scale,
        }
    }

    /// Spawn the expiry sweeper and, when enabled, the auto-scale monitor.
    ///
    /// Must be called from within a Tokio runtime. Calling it twice is a no-op.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.inner.tasks.lock();
        if tasks.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        let weak = Arc::downgrade(&self.inner);
        handles.push(spawn_periodic(
            "expiry sweeper",
            self.inner.cleanup_interval,
            weak.clone(),
            shutdown_rx.clone(),
            |cache| {
                cache.purge_expired();
            },
        ));

        if self.inner.auto_scale.is_some() {
            handles.push(spawn_periodic(
                "auto-scale monitor",
                self.inner.auto_scale_interval,
                weak,
                shutdown_rx,
                |cache| {
                    cache.run_auto_scale();
                },
            ));
        }

        tracing::info!(
            policy = %self.inner.policy,
            cleanup_interval_secs = self.inner.cleanup_interval.as_secs(),
            auto_scale = self.inner.auto_scale.is_some(),
            "local cache background tasks started"
        );
        *tasks = Some(BackgroundTasks {
            shutdown: shutdown_tx,
            handles,
        });
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        let tasks = self.inner.tasks.lock().take();
        let Some(tasks) = tasks else {
            return;
        };
        let _ = tasks.shutdown.send(true);
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "local cache background task ended abnormally");
            }
        }
        tracing::debug!("local cache background tasks stopped");
    }
}

/// Run `tick` every `period` until shutdown is signalled or the cache is dropped.
fn spawn_periodic(
    name: &'static str,
    period: Duration,
    cache: Weak<LocalInner>,
    mut shutdown_rx: watch::Receiver<bool>,
    tick: fn(&LocalCache),
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = cache.upgrade() else {
                        break;
                    };
                    tick(&LocalCache { inner });
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(task = name, "background task exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::FixedMemoryPressure;

    fn config(max_entries: usize) -> CacheConfig {
        CacheConfig {
            max_entries,
            ..Default::default()
        }
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_query(name, None)
    }

    #[test]
    fn read_after_write() {
        let cache = LocalCache::new(&config(10));
        cache.set(key("q"), "answer", ResponseSource::Model);
        let hit = cache.get(&key("q")).unwrap();
        assert_eq!(hit.value, "answer");
        assert_eq!(hit.source, ResponseSource::Model);
    }

    #[test]
    fn hit_rate_is_a_percentage() {
        let cache = LocalCache::new(&config(10));
        cache.set(key("q"), "answer", ResponseSource::Model);
        cache.get(&key("q"));
        cache.get(&key("q"));
        cache.get(&key("q"));
        cache.get(&key("other"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn auto_scale_grows_and_shrinks() {
        let cfg = CacheConfig {
            max_entries: 10,
            auto_scale: true,
            auto_scale_max_entries: Some(40),
            ..Default::default()
        };
        let cache = LocalCache::with_probe(&cfg, Arc::new(FixedMemoryPressure(Some(0.2))));
        for i in 0..10 {
            cache.set(key(&format!("q{i}")), "v", ResponseSource::Model);
        }
        assert_eq!(
            cache.run_auto_scale(),
            ScaleDecision::Grow { from: 10, to: 20 }
        );
        assert_eq!(cache.max_entries(), 20);

        cache.clear();
        assert_eq!(
            cache.run_auto_scale(),
            ScaleDecision::Shrink { from: 20, to: 10 }
        );
        let stats = cache.stats();
        assert_eq!(stats.auto_scale.scale_ups, 1);
        assert_eq!(stats.auto_scale.scale_downs, 1);
        assert_eq!(stats.auto_scale.current_max_entries, 10);
    }

    #[test]
    fn auto_scale_disabled_holds() {
        let cache = LocalCache::new(&config(1));
        cache.set(key("q"), "v", ResponseSource::Model);
        assert_eq!(cache.run_auto_scale(), ScaleDecision::Hold);
        assert_eq!(cache.max_entries(), 1);
    }

    #[tokio::test]
    async fn background_sweeper_removes_expired_entries() {
        let cfg = CacheConfig {
            ttl_secs: 1,
            cleanup_interval_secs: 1,
            ..Default::default()
        };
        let cache = LocalCache::new(&cfg);
        cache.start_background_tasks();
        cache.set(key("q"), "v", ResponseSource::Model);
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(2300)).await;
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().evictions.ttl, 1);

        cache.shutdown().await;
        // Second shutdown is a no-op.
        cache.shutdown().await;
    }
}
