//! Multi-tier response cache for the chat backend.
//!
//! Repeated or near-identical questions are answered from cache instead of
//! being regenerated. Two deployments are supported:
//!
//! - **local**: a bounded in-process store ([`LocalCache`])
//! - **hybrid**: the in-process store in front of a shared Redis tier
//!   ([`HybridCache`]), for multiple backend instances
//!
//! The process builds one [`ResponseCache`] at startup through
//! [`create_response_cache`] and hands clones of a [`ResponseCacheFacade`] to
//! request handlers. Cache failures are never visible to end users: a remote
//! outage degrades to local-only operation and capacity pressure is resolved
//! by eviction.

pub mod config;
pub mod entry;
pub mod error;
pub mod facade;
pub mod hybrid;
pub mod key;
pub mod local;
pub mod metrics;
pub mod observability;
pub mod remote;

use std::sync::Arc;

pub use config::{AppConfig, CacheConfig, CacheType, LoggingConfig, RedisConfig};
pub use entry::{CacheEntry, CachedResponse, DistributedCacheEntry, ResponseSource};
pub use error::{CacheError, CacheResult, RemoteError, RemoteResult};
pub use facade::{CacheStats, RemoteSummary, ResponseCache, ResponseCacheFacade};
pub use hybrid::{HybridCache, HybridStats};
pub use key::{CacheKey, normalize_query};
pub use local::{EvictionPolicy, LocalCache, LocalStats};
pub use observability::{init_tracing, init_tracing_with_level};
pub use remote::{RedisTier, RemoteLookup, RemoteStats, RemoteStore};

/// Build the configured cache variant and start its background tasks.
///
/// Must be called from within a Tokio runtime.
///
/// ## Graceful Degradation
///
/// In hybrid mode a Redis pool that cannot be created falls back to
/// local-only mode with a warning. An unreachable server is not an error: the
/// hybrid cache starts degraded and recovers once the health check succeeds.
pub async fn create_response_cache(config: &AppConfig) -> CacheResult<ResponseCache> {
    let cache = build_response_cache(config).await?;
    cache.start_background_tasks();
    Ok(cache)
}

/// Like [`create_response_cache`] but without background tasks, for
/// short-lived tools.
pub async fn build_response_cache(config: &AppConfig) -> CacheResult<ResponseCache> {
    config.validate()?;

    let local = LocalCache::new(&config.cache);
    match config.cache.cache_type {
        CacheType::Local => {
            tracing::info!(
                max_entries = config.cache.max_entries,
                policy = %config.cache.eviction_policy,
                "using local response cache"
            );
            Ok(ResponseCache::Local(local))
        }
        CacheType::Hybrid => {
            let tier = match RedisTier::new(
                &config.redis,
                config.cache.eviction_policy,
                config.cache.memory_target_ratio,
            ) {
                Ok(tier) => tier,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to create Redis pool. Falling back to local cache."
                    );
                    return Ok(ResponseCache::Local(local));
                }
            };

            let node_id = config
                .cache
                .node_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let hybrid = HybridCache::new(local, Arc::new(tier), &config.redis, node_id);

            if hybrid.check_health().await {
                tracing::info!(node_id = %hybrid.node_id(), "connected to Redis cache tier");
            }
            metrics::set_remote_available(hybrid.is_remote_available());
            Ok(ResponseCache::Hybrid(hybrid))
        }
    }
}
