//! Redis implementation of the remote tier.

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

use super::eviction::{RemoteRecord, plan_eviction};
use super::{EnforceReport, RemoteLookup, RemoteStats, RemoteStore};
use crate::config::RedisConfig;
use crate::entry::DistributedCacheEntry;
use crate::error::{RemoteError, RemoteResult};
use crate::key::CacheKey;
use crate::local::EvictionPolicy;
use crate::metrics;

/// Keys fetched per SCAN, MGET and DEL round trip.
const BATCH_SIZE: usize = 500;

/// Shared cache tier backed by a Redis connection pool.
///
/// Records live under `{prefix}:entry:{key}` as JSON and expire through the
/// server's native TTL. Every command is bounded by the configured timeout,
/// including the pool checkout, so an unreachable server costs at most one
/// timeout per call.
pub struct RedisTier {
    pool: Pool,
    prefix: String,
    timeout: Duration,
    ttl: Duration,
    max_entries: usize,
    max_memory_bytes: u64,
    policy: EvictionPolicy,
    memory_target_ratio: f64,
    reachable: AtomicBool,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    evictions: AtomicU64,
    corrupt: AtomicU64,
}

enum Fetched {
    Record(DistributedCacheEntry),
    Corrupt(serde_json::Error),
    Absent,
}

impl RedisTier {
    /// Build the tier. Connections are opened lazily on first use, so this
    /// only fails on a malformed URL or pool configuration.
    pub fn new(
        config: &RedisConfig,
        policy: EvictionPolicy,
        memory_target_ratio: f64,
    ) -> RemoteResult<Self> {
        let timeout = config.timeout();

        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        redis_config.pool = Some(pool_config);
        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;

        tracing::info!(
            url = %redact_url(&config.url),
            pool_size = config.pool_size,
            timeout_ms = config.timeout_ms,
            prefix = %config.key_prefix,
            "Redis cache tier configured"
        );

        Ok(Self {
            pool,
            prefix: config.key_prefix.clone(),
            timeout,
            ttl: config.ttl(),
            max_entries: config.max_entries,
            max_memory_bytes: config.max_memory_bytes(),
            policy,
            memory_target_ratio,
            reachable: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    /// Native TTL applied to records written by this tier.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}:entry:{}", self.prefix, key.as_str())
    }

    fn entry_pattern(&self) -> String {
        format!("{}:entry:*", self.prefix)
    }

    fn cache_key(&self, storage_key: &str) -> Option<CacheKey> {
        storage_key
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix(":entry:"))
            .map(CacheKey::from_raw)
    }

    async fn bounded<T, E, F>(&self, fut: F) -> RemoteResult<T>
    where
        F: Future<Output = Result<T, E>>,
        RemoteError: From<E>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RemoteError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    async fn connection(&self) -> RemoteResult<Connection> {
        self.bounded(self.pool.get()).await
    }

    fn succeeded(&self) {
        self.reachable.store(true, Ordering::Relaxed);
    }

    fn fail(&self, operation: &'static str, error: &RemoteError) {
        self.reachable.store(false, Ordering::Relaxed);
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_remote_error(operation);
        tracing::warn!(operation, error = %error, "Redis cache operation failed");
    }

    /// Fetch a record and write back its touched access metadata.
    async fn fetch(&self, storage_key: &str) -> RemoteResult<Fetched> {
        let mut conn = self.connection().await?;
        let raw: Option<Vec<u8>> = self.bounded(conn.get(storage_key)).await?;
        let Some(raw) = raw else {
            return Ok(Fetched::Absent);
        };

        let mut record = match DistributedCacheEntry::from_bytes(&raw) {
            Ok(record) => record,
            Err(e) => {
                let _: usize = self.bounded(conn.del(storage_key)).await?;
                return Ok(Fetched::Corrupt(e));
            }
        };

        record.access_count = record.access_count.saturating_add(1);
        record.last_accessed_at = OffsetDateTime::now_utc();
        let bytes = record.to_bytes()?;
        // XX: do not resurrect a record that expired since the GET
        let write_back: RemoteResult<Option<String>> = self
            .bounded(
                redis::cmd("SET")
                    .arg(storage_key)
                    .arg(bytes)
                    .arg("KEEPTTL")
                    .arg("XX")
                    .query_async(&mut conn),
            )
            .await;
        // The read already succeeded; a refused write (OOM, read-only replica)
        // only loses the access metadata.
        if let Err(e) = write_back {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            metrics::record_remote_error("touch");
            tracing::warn!(
                key = %storage_key,
                error = %e,
                "failed to write back access metadata"
            );
        }

        Ok(Fetched::Record(record))
    }

    async fn store(
        &self,
        storage_key: &str,
        entry: &DistributedCacheEntry,
        ttl: Duration,
    ) -> RemoteResult<()> {
        let bytes = entry.to_bytes()?;
        let mut conn = self.connection().await?;
        let secs = ttl.as_secs().max(1);
        let _: () = self.bounded(conn.set_ex(storage_key, bytes, secs)).await?;
        Ok(())
    }

    async fn scan_storage_keys(&self) -> RemoteResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let pattern = self.entry_pattern();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(BATCH_SIZE)
                        .query_async(&mut conn),
                )
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    async fn delete_all(&self, storage_keys: &[String]) -> RemoteResult<usize> {
        if storage_keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let mut removed = 0;
        for chunk in storage_keys.chunks(BATCH_SIZE) {
            let n: usize = self.bounded(conn.del(chunk)).await?;
            removed += n;
        }
        Ok(removed)
    }

    async fn load_records(
        &self,
        storage_keys: Vec<String>,
    ) -> RemoteResult<(Vec<RemoteRecord>, Vec<String>)> {
        let mut conn = self.connection().await?;
        let mut records = Vec::with_capacity(storage_keys.len());
        let mut corrupt = Vec::new();

        for chunk in storage_keys.chunks(BATCH_SIZE) {
            let values: Vec<Option<Vec<u8>>> = self
                .bounded(redis::cmd("MGET").arg(chunk).query_async(&mut conn))
                .await?;
            for (storage_key, raw) in chunk.iter().zip(values) {
                // Expired between SCAN and MGET
                let Some(raw) = raw else {
                    continue;
                };
                match DistributedCacheEntry::from_bytes(&raw) {
                    Ok(entry) => records.push(RemoteRecord {
                        storage_key: storage_key.clone(),
                        entry,
                        size: storage_key.len() + raw.len(),
                    }),
                    Err(e) => {
                        tracing::debug!(
                            key = %storage_key,
                            error = %e,
                            "malformed record found during enforcement"
                        );
                        corrupt.push(storage_key.clone());
                    }
                }
            }
        }
        Ok((records, corrupt))
    }

    async fn enforce(&self) -> RemoteResult<EnforceReport> {
        let storage_keys = self.scan_storage_keys().await?;
        let scanned = storage_keys.len();
        let (records, corrupt) = self.load_records(storage_keys).await?;

        let plan = plan_eviction(
            records,
            self.policy,
            self.max_entries,
            self.max_memory_bytes,
            self.memory_target_ratio,
        );

        let corrupt_removed = self.delete_all(&corrupt).await?;
        let victims: Vec<String> = plan.keys().cloned().collect();
        self.delete_all(&victims).await?;

        Ok(EnforceReport {
            scanned,
            evicted_by_count: plan.by_count.len(),
            evicted_by_memory: plan.by_memory.len(),
            corrupt_removed,
        })
    }

    async fn used_memory(&self) -> RemoteResult<Option<u64>> {
        let mut conn = self.connection().await?;
        let info: String = self
            .bounded(redis::cmd("INFO").arg("memory").query_async(&mut conn))
            .await?;
        Ok(parse_used_memory(&info))
    }

    fn counters_snapshot(&self) -> RemoteStats {
        let c = &self.counters;
        RemoteStats {
            backend: self.name(),
            reachable: self.reachable.load(Ordering::Relaxed),
            entries: None,
            max_entries: self.max_entries,
            used_memory_bytes: None,
            max_memory_bytes: self.max_memory_bytes,
            ttl_secs: self.ttl.as_secs(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            corrupt_records: c.corrupt.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl RemoteStore for RedisTier {
    async fn get(&self, key: &CacheKey) -> RemoteLookup {
        let storage_key = self.storage_key(key);
        match self.fetch(&storage_key).await {
            Ok(Fetched::Record(record)) => {
                self.succeeded();
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                RemoteLookup::Hit(record)
            }
            Ok(Fetched::Corrupt(e)) => {
                self.succeeded();
                self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "removed malformed record from Redis");
                RemoteLookup::Miss
            }
            Ok(Fetched::Absent) => {
                self.succeeded();
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                RemoteLookup::Miss
            }
            Err(e) => {
                self.fail("get", &e);
                RemoteLookup::Unavailable
            }
        }
    }

    async fn set(&self, key: &CacheKey, entry: &DistributedCacheEntry, ttl: Duration) -> bool {
        let storage_key = self.storage_key(key);
        match self.store(&storage_key, entry, ttl).await {
            Ok(()) => {
                self.succeeded();
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (L2)");
                true
            }
            Err(e) => {
                self.fail("set", &e);
                false
            }
        }
    }

    async fn delete(&self, key: &CacheKey) -> bool {
        let storage_key = self.storage_key(key);
        let result = async {
            let mut conn = self.connection().await?;
            let removed: usize = self.bounded(conn.del(&storage_key)).await?;
            Ok::<_, RemoteError>(removed)
        }
        .await;
        match result {
            Ok(removed) => {
                self.succeeded();
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                removed > 0
            }
            Err(e) => {
                self.fail("delete", &e);
                false
            }
        }
    }

    async fn clear(&self) -> bool {
        let result = async {
            let keys = self.scan_storage_keys().await?;
            self.delete_all(&keys).await
        }
        .await;
        match result {
            Ok(removed) => {
                self.succeeded();
                tracing::info!(removed, prefix = %self.prefix, "cleared Redis cache tier");
                true
            }
            Err(e) => {
                self.fail("clear", &e);
                false
            }
        }
    }

    async fn keys(&self) -> Vec<CacheKey> {
        match self.scan_storage_keys().await {
            Ok(storage_keys) => {
                self.succeeded();
                storage_keys
                    .iter()
                    .filter_map(|k| self.cache_key(k))
                    .collect()
            }
            Err(e) => {
                self.fail("keys", &e);
                Vec::new()
            }
        }
    }

    async fn size(&self) -> Option<usize> {
        match self.scan_storage_keys().await {
            Ok(storage_keys) => {
                self.succeeded();
                Some(storage_keys.len())
            }
            Err(e) => {
                self.fail("size", &e);
                None
            }
        }
    }

    async fn ping(&self) -> bool {
        let result = async {
            let mut conn = self.connection().await?;
            let reply: String = self
                .bounded(redis::cmd("PING").query_async(&mut conn))
                .await?;
            Ok::<_, RemoteError>(reply)
        }
        .await;
        match result {
            Ok(_) => {
                self.succeeded();
                true
            }
            Err(e) => {
                self.fail("ping", &e);
                false
            }
        }
    }

    async fn enforce_limits(&self) -> EnforceReport {
        match self.enforce().await {
            Ok(report) => {
                self.succeeded();
                let evicted = report.evicted_by_count + report.evicted_by_memory;
                self.counters
                    .evictions
                    .fetch_add(evicted as u64, Ordering::Relaxed);
                self.counters
                    .corrupt
                    .fetch_add(report.corrupt_removed as u64, Ordering::Relaxed);
                if evicted > 0 || report.corrupt_removed > 0 {
                    tracing::info!(
                        scanned = report.scanned,
                        by_count = report.evicted_by_count,
                        by_memory = report.evicted_by_memory,
                        corrupt = report.corrupt_removed,
                        "enforced Redis cache limits"
                    );
                }
                report
            }
            Err(e) => {
                self.fail("enforce_limits", &e);
                EnforceReport::default()
            }
        }
    }

    async fn memory_usage(&self) -> Option<u64> {
        match self.used_memory().await {
            Ok(used) => {
                self.succeeded();
                used
            }
            Err(e) => {
                self.fail("memory_usage", &e);
                None
            }
        }
    }

    async fn stats(&self) -> RemoteStats {
        let entries = self.size().await;
        let used_memory_bytes = match entries {
            Some(_) => self.memory_usage().await,
            None => None,
        };

        RemoteStats {
            entries,
            used_memory_bytes,
            ..self.counters_snapshot()
        }
    }

    fn snapshot(&self) -> RemoteStats {
        self.counters_snapshot()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Extract `used_memory` from an `INFO memory` reply.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Hide the password part of a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://***@{host}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_used_memory_from_info() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_used_memory(info), Some(1_048_576));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }

    #[test]
    fn redacts_credentials() {
        assert_eq!(redact_url("redis://:secret@cache:6379"), "redis://***@cache:6379");
        assert_eq!(redact_url("redis://localhost:6379"), "redis://localhost:6379");
    }

    #[tokio::test]
    async fn storage_keys_are_namespaced() {
        let config = RedisConfig {
            key_prefix: "chat".into(),
            ..Default::default()
        };
        let tier = RedisTier::new(&config, EvictionPolicy::Lru, 0.8).unwrap();
        let key = CacheKey::from_raw("abc");

        assert_eq!(tier.storage_key(&key), "chat:entry:abc");
        assert_eq!(tier.entry_pattern(), "chat:entry:*");
        assert_eq!(tier.cache_key("chat:entry:abc"), Some(key));
        assert_eq!(tier.cache_key("other:entry:abc"), None);
    }
}
