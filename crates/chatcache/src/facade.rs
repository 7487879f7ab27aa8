//! The cache handle handed to the chat backend.

use serde::Serialize;

use crate::config::CacheType;
use crate::entry::{CachedResponse, ResponseSource};
use crate::hybrid::{HybridCache, HybridStats};
use crate::key::CacheKey;
use crate::local::{AutoScaleStats, EvictionCounts, LocalCache, LocalStats};
use crate::remote::RemoteStats;

/// Configured cache variant.
///
/// ## Cache Modes
///
/// - **Local**: single instance, in-process store only
/// - **Hybrid**: in-process L1 in front of a shared Redis L2
///
/// Both variants expose the same async contract.
#[derive(Clone)]
pub enum ResponseCache {
    Local(LocalCache),
    Hybrid(HybridCache),
}

/// Combined statistics for either variant.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub mode: CacheType,
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups served from cache (either tier)
    pub hit_rate: f64,
    pub memory_mb: f64,
    pub memory_percent: f64,
    pub evictions: EvictionCounts,
    pub auto_scale: AutoScaleStats,
    pub local: LocalStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSummary>,
}

/// Hybrid-only part of [`CacheStats`].
#[derive(Debug, Clone, Serialize)]
pub struct RemoteSummary {
    pub node_id: String,
    pub available: bool,
    pub degraded_for_secs: Option<u64>,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub write_failures: u64,
    pub stats: RemoteStats,
}

impl CacheStats {
    fn from_local(mode: CacheType, local: LocalStats, hit_rate: f64) -> Self {
        Self {
            mode,
            entries: local.entries,
            max_entries: local.max_entries,
            hits: local.hits,
            misses: local.misses,
            hit_rate,
            memory_mb: local.memory_mb,
            memory_percent: local.memory_percent,
            evictions: local.evictions,
            auto_scale: local.auto_scale.clone(),
            local,
            remote: None,
        }
    }
}

impl From<HybridStats> for CacheStats {
    fn from(stats: HybridStats) -> Self {
        let HybridStats {
            node_id,
            remote_available,
            degraded_for_secs,
            l2_hits,
            l2_misses,
            remote_write_failures,
            hit_rate,
            local,
            remote,
        } = stats;
        let mut combined = Self::from_local(CacheType::Hybrid, local, hit_rate);
        // L2 hits were L1 misses; report them as hits of the cache as a whole
        combined.hits += l2_hits;
        combined.misses = combined.misses.saturating_sub(l2_hits);
        combined.remote = Some(RemoteSummary {
            node_id,
            available: remote_available,
            degraded_for_secs,
            l2_hits,
            l2_misses,
            write_failures: remote_write_failures,
            stats: remote,
        });
        combined
    }
}

impl ResponseCache {
    pub fn mode(&self) -> CacheType {
        match self {
            ResponseCache::Local(_) => CacheType::Local,
            ResponseCache::Hybrid(_) => CacheType::Hybrid,
        }
    }

    /// The in-process tier, present in every variant.
    pub fn local(&self) -> &LocalCache {
        match self {
            ResponseCache::Local(local) => local,
            ResponseCache::Hybrid(hybrid) => hybrid.local(),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        match self {
            ResponseCache::Local(local) => local.get(key),
            ResponseCache::Hybrid(hybrid) => hybrid.get(key).await,
        }
    }

    pub async fn set(&self, key: CacheKey, value: impl Into<String>, source: ResponseSource) {
        match self {
            ResponseCache::Local(local) => local.set(key, value, source),
            ResponseCache::Hybrid(hybrid) => hybrid.set(key, value, source).await,
        }
    }

    pub async fn delete(&self, key: &CacheKey) -> bool {
        match self {
            ResponseCache::Local(local) => local.delete(key),
            ResponseCache::Hybrid(hybrid) => hybrid.delete(key).await,
        }
    }

    pub async fn clear(&self) {
        match self {
            ResponseCache::Local(local) => local.clear(),
            ResponseCache::Hybrid(hybrid) => hybrid.clear().await,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        match self {
            ResponseCache::Local(local) => {
                let stats = local.stats();
                let hit_rate = stats.hit_rate;
                CacheStats::from_local(CacheType::Local, stats, hit_rate)
            }
            ResponseCache::Hybrid(hybrid) => hybrid.stats().await.into(),
        }
    }

    pub fn start_background_tasks(&self) {
        match self {
            ResponseCache::Local(local) => local.start_background_tasks(),
            ResponseCache::Hybrid(hybrid) => hybrid.start_background_tasks(),
        }
    }

    pub async fn shutdown(&self) {
        match self {
            ResponseCache::Local(local) => local.shutdown().await,
            ResponseCache::Hybrid(hybrid) => hybrid.shutdown().await,
        }
    }
}

/// Query-level API used by the request handlers.
///
/// Callers pass the raw query text and optional conversation context; key
/// derivation and normalization happen here.
#[derive(Clone)]
pub struct ResponseCacheFacade {
    cache: ResponseCache,
}

impl ResponseCacheFacade {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn lookup(&self, query: &str, context: Option<&str>) -> Option<CachedResponse> {
        let key = CacheKey::from_query(query, context);
        self.cache.get(&key).await
    }

    pub async fn store(
        &self,
        query: &str,
        context: Option<&str>,
        value: impl Into<String>,
        source: ResponseSource,
    ) {
        let key = CacheKey::from_query(query, context);
        tracing::debug!(key = %key, source = %source, "storing response");
        self.cache.set(key, value, source).await;
    }

    pub async fn invalidate(&self, query: &str, context: Option<&str>) -> bool {
        let key = CacheKey::from_query(query, context);
        self.cache.delete(&key).await
    }

    pub async fn invalidate_all(&self) {
        self.cache.clear().await;
        tracing::info!(mode = %self.cache.mode(), "response cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }
}

impl From<ResponseCache> for ResponseCacheFacade {
    fn from(cache: ResponseCache) -> Self {
        Self::new(cache)
    }
}
