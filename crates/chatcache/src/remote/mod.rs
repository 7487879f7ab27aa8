//! Shared remote (L2) tier.
//!
//! The remote tier is optional infrastructure. Every operation is bounded by
//! a timeout and failures never propagate: reads report
//! [`RemoteLookup::Unavailable`], writes report `false`.

mod eviction;
mod redis_tier;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::entry::DistributedCacheEntry;
use crate::key::CacheKey;

pub use self::eviction::{EvictionPlan, RemoteRecord, plan_eviction};
pub use self::redis_tier::RedisTier;

/// Outcome of a remote read.
#[derive(Debug, Clone)]
pub enum RemoteLookup {
    Hit(DistributedCacheEntry),
    Miss,
    /// The store could not be reached or did not answer in time
    Unavailable,
}

/// Result of one `enforce_limits` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnforceReport {
    pub scanned: usize,
    pub evicted_by_count: usize,
    pub evicted_by_memory: usize,
    pub corrupt_removed: usize,
}

/// Remote tier statistics. Fields read from the server are `None` when it
/// could not be reached.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteStats {
    pub backend: &'static str,
    pub reachable: bool,
    pub entries: Option<usize>,
    pub max_entries: usize,
    /// Server-wide `used_memory` as reported by the store
    pub used_memory_bytes: Option<u64>,
    pub max_memory_bytes: u64,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub errors: u64,
    pub evictions: u64,
    pub corrupt_records: u64,
}

/// Contract of a shared key/value store holding [`DistributedCacheEntry`]s.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> RemoteLookup;

    /// Store `entry` with the store's native expiry set to `ttl`.
    async fn set(&self, key: &CacheKey, entry: &DistributedCacheEntry, ttl: Duration) -> bool;

    async fn delete(&self, key: &CacheKey) -> bool;

    /// Remove every entry owned by this cache (not the whole server).
    async fn clear(&self) -> bool;

    async fn keys(&self) -> Vec<CacheKey>;

    async fn size(&self) -> Option<usize>;

    /// Memory used by the store, `None` when unknown or unreachable.
    async fn memory_usage(&self) -> Option<u64>;

    /// Liveness probe.
    async fn ping(&self) -> bool;

    /// Apply the entry-count and memory limits to the remote side.
    async fn enforce_limits(&self) -> EnforceReport;

    async fn stats(&self) -> RemoteStats;

    /// Counter-only statistics, no I/O.
    fn snapshot(&self) -> RemoteStats;

    fn name(&self) -> &'static str;
}
