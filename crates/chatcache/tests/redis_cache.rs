//! Integration tests for the Redis tier.
//!
//! Tests use testcontainers to spin up a real Redis instance and are ignored
//! by default; run them with `--ignored` on a machine with Docker.

use chatcache::local::EvictionPolicy;
use chatcache::{
    AppConfig, CacheConfig, CacheEntry, CacheKey, CacheType, DistributedCacheEntry, RedisConfig,
    RedisTier, RemoteLookup, RemoteStore, ResponseSource, create_response_cache,
};
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            (container, format!("redis://127.0.0.1:{host_port}"))
        })
        .await;
    url.clone()
}

/// Each test gets its own key prefix so they can share the container.
async fn redis_config(prefix: &str) -> RedisConfig {
    RedisConfig {
        url: get_redis_url().await,
        key_prefix: prefix.to_string(),
        ..Default::default()
    }
}

fn record(value: &str) -> DistributedCacheEntry {
    DistributedCacheEntry::from_entry(&CacheEntry::new(value, ResponseSource::Model), "node-test")
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_round_trip_and_access_write_back() {
    let tier = RedisTier::new(&redis_config("rt").await, EvictionPolicy::Lru, 0.8).unwrap();
    let key = CacheKey::from_query("hello", None);

    assert!(tier.ping().await);
    assert!(tier.set(&key, &record("hi"), Duration::from_secs(60)).await);

    match tier.get(&key).await {
        RemoteLookup::Hit(entry) => {
            assert_eq!(entry.value, "hi");
            assert_eq!(entry.access_count, 1);
        }
        other => panic!("expected hit, got {other:?}"),
    }
    match tier.get(&key).await {
        RemoteLookup::Hit(entry) => assert_eq!(entry.access_count, 2),
        other => panic!("expected hit, got {other:?}"),
    }

    assert_eq!(tier.keys().await, vec![key.clone()]);
    assert_eq!(tier.size().await, Some(1));
    assert!(tier.memory_usage().await.is_some());

    assert!(tier.delete(&key).await);
    assert!(matches!(tier.get(&key).await, RemoteLookup::Miss));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_clear_only_touches_own_prefix() {
    let ours = RedisTier::new(&redis_config("ours").await, EvictionPolicy::Lru, 0.8).unwrap();
    let theirs = RedisTier::new(&redis_config("theirs").await, EvictionPolicy::Lru, 0.8).unwrap();
    let key = CacheKey::from_raw("shared");

    assert!(ours.set(&key, &record("a"), Duration::from_secs(60)).await);
    assert!(theirs.set(&key, &record("b"), Duration::from_secs(60)).await);

    assert!(ours.clear().await);
    assert_eq!(ours.size().await, Some(0));
    assert_eq!(theirs.size().await, Some(1));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_malformed_record_is_deleted() {
    let config = redis_config("corrupt").await;
    let tier = RedisTier::new(&config, EvictionPolicy::Lru, 0.8).unwrap();

    let client = redis::Client::open(config.url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("SET")
        .arg("corrupt:entry:broken")
        .arg("{not json")
        .query_async(&mut conn)
        .await
        .unwrap();

    let key = CacheKey::from_raw("broken");
    assert!(matches!(tier.get(&key).await, RemoteLookup::Miss));
    assert_eq!(tier.size().await, Some(0));
    assert_eq!(tier.snapshot().corrupt_records, 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_enforce_limits_trims_by_count() {
    let config = RedisConfig {
        max_entries: 3,
        ..redis_config("limits").await
    };
    let tier = RedisTier::new(&config, EvictionPolicy::Fifo, 0.8).unwrap();

    for i in 0..5 {
        let key = CacheKey::from_raw(format!("k{i}"));
        assert!(tier.set(&key, &record("v"), Duration::from_secs(60)).await);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let report = tier.enforce_limits().await;
    assert_eq!(report.scanned, 5);
    assert_eq!(report.evicted_by_count, 2);
    assert_eq!(tier.size().await, Some(3));

    let mut keys: Vec<String> = tier.keys().await.iter().map(|k| k.to_string()).collect();
    keys.sort();
    assert_eq!(keys, vec!["k2", "k3", "k4"]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_hybrid_cache_shares_entries_between_instances() {
    let config = AppConfig {
        cache: CacheConfig {
            cache_type: CacheType::Hybrid,
            ..Default::default()
        },
        redis: redis_config("hybrid").await,
        ..Default::default()
    };

    let first = create_response_cache(&config).await.unwrap();
    let second = create_response_cache(&config).await.unwrap();
    let key = CacheKey::from_query("shipping time", None);

    first
        .set(key.clone(), "2-3 days", ResponseSource::KnowledgeBase)
        .await;
    let hit = second.get(&key).await.expect("shared through Redis");
    assert_eq!(hit.value, "2-3 days");

    let stats = second.stats().await;
    let remote = stats.remote.expect("hybrid summary");
    assert!(remote.available);
    assert_eq!(remote.l2_hits, 1);

    first.shutdown().await;
    second.shutdown().await;
}
