//! Behavioural tests for the in-process cache engine.

use chatcache::{CacheConfig, CacheKey, EvictionPolicy, LocalCache, ResponseSource};
use std::time::Duration;

fn key(name: &str) -> CacheKey {
    CacheKey::from_query(name, None)
}

fn cache_with(max_entries: usize, policy: EvictionPolicy) -> LocalCache {
    LocalCache::new(&CacheConfig {
        max_entries,
        eviction_policy: policy,
        ..Default::default()
    })
}

#[test]
fn test_read_after_write() {
    let cache = cache_with(100, EvictionPolicy::Lru);
    for i in 0..50 {
        cache.set(key(&format!("question {i}")), format!("answer {i}"), ResponseSource::Model);
        let hit = cache.get(&key(&format!("question {i}"))).expect("just written");
        assert_eq!(hit.value, format!("answer {i}"));
    }
}

#[test]
fn test_overwrite_replaces_value() {
    let cache = cache_with(10, EvictionPolicy::Fifo);
    cache.set(key("q"), "first", ResponseSource::Model);
    cache.set(key("q"), "second", ResponseSource::KnowledgeBase);

    assert_eq!(cache.len(), 1);
    let hit = cache.get(&key("q")).unwrap();
    assert_eq!(hit.value, "second");
    assert_eq!(hit.source, ResponseSource::KnowledgeBase);
}

#[test]
fn test_lru_keeps_recently_read_entry() {
    let cache = cache_with(2, EvictionPolicy::Lru);
    cache.set(key("A"), "a", ResponseSource::Model);
    cache.set(key("B"), "b", ResponseSource::Model);
    assert!(cache.get(&key("A")).is_some());
    cache.set(key("C"), "c", ResponseSource::Model);

    assert!(cache.contains(&key("A")));
    assert!(!cache.contains(&key("B")));
    assert!(cache.contains(&key("C")));
    assert_eq!(cache.stats().evictions.count_limit, 1);
}

#[test]
fn test_fifo_ignores_reads() {
    let cache = cache_with(2, EvictionPolicy::Fifo);
    cache.set(key("A"), "a", ResponseSource::Model);
    cache.set(key("B"), "b", ResponseSource::Model);
    assert!(cache.get(&key("A")).is_some());
    cache.set(key("C"), "c", ResponseSource::Model);

    assert!(!cache.contains(&key("A")));
    assert!(cache.contains(&key("B")));
    assert!(cache.contains(&key("C")));
}

#[test]
fn test_lfu_evicts_least_used() {
    let cache = cache_with(2, EvictionPolicy::Lfu);
    cache.set(key("A"), "a", ResponseSource::Model);
    cache.set(key("B"), "b", ResponseSource::Model);
    cache.get(&key("A"));
    cache.get(&key("A"));
    cache.get(&key("B"));
    cache.set(key("C"), "c", ResponseSource::Model);

    assert!(cache.contains(&key("A")));
    assert!(!cache.contains(&key("B")));
    assert!(cache.contains(&key("C")));
}

#[test]
fn test_limits_hold_after_every_set() {
    for policy in [
        EvictionPolicy::Lru,
        EvictionPolicy::Fifo,
        EvictionPolicy::Lfu,
        EvictionPolicy::Random,
        EvictionPolicy::TtlAware,
    ] {
        let cache = LocalCache::new(&CacheConfig {
            max_entries: 25,
            max_memory_mb: 1,
            eviction_policy: policy,
            ..Default::default()
        });
        let large = "x".repeat(64 * 1024);
        for i in 0..200 {
            let value = if i % 3 == 0 { large.clone() } else { format!("short {i}") };
            cache.set(key(&format!("q{i}")), value, ResponseSource::Model);
            if i % 7 == 0 {
                cache.get(&key(&format!("q{}", i / 2)));
            }

            let stats = cache.stats();
            assert!(stats.entries <= stats.max_entries, "{policy}: entry limit broken");
            assert!(stats.memory_bytes <= stats.max_memory_bytes, "{policy}: memory limit broken");
        }
        assert!(cache.stats().evictions.total() > 0);
    }
}

#[test]
fn test_clear_is_idempotent() {
    let cache = cache_with(10, EvictionPolicy::Lru);
    cache.set(key("a"), "1", ResponseSource::Model);
    cache.set(key("b"), "2", ResponseSource::Model);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().memory_bytes, 0);

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.get(&key("a")).is_none());
}

#[test]
fn test_delete_reports_presence() {
    let cache = cache_with(10, EvictionPolicy::Lru);
    cache.set(key("a"), "1", ResponseSource::Model);
    assert!(cache.delete(&key("a")));
    assert!(!cache.delete(&key("a")));
}

#[tokio::test]
async fn test_ttl_law() {
    let cache = LocalCache::new(&CacheConfig {
        ttl_secs: 1,
        ..Default::default()
    });
    cache.set(key("q"), "v", ResponseSource::Model);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(cache.get(&key("q")).is_some(), "retrievable before the TTL");

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(cache.get(&key("q")).is_none(), "expired after the TTL");
    assert_eq!(cache.len(), 0);
}

#[tokio::test]
async fn test_purge_expired_sweeps_everything_old() {
    let cache = LocalCache::new(&CacheConfig {
        ttl_secs: 1,
        ..Default::default()
    });
    for i in 0..5 {
        cache.set(key(&format!("q{i}")), "v", ResponseSource::Model);
    }
    tokio::time::sleep(Duration::from_millis(1200)).await;
    cache.set(key("fresh"), "v", ResponseSource::Model);

    assert_eq!(cache.purge_expired(), 5);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().evictions.ttl, 5);
}

#[test]
fn test_key_normalization() {
    let cache = cache_with(10, EvictionPolicy::Lru);
    cache.set(CacheKey::from_query("Hello ", None), "hi", ResponseSource::Static);
    assert!(cache.get(&CacheKey::from_query("hello", None)).is_some());
    assert!(cache.get(&CacheKey::from_query("  HELLO\t", None)).is_some());
    assert!(cache.get(&CacheKey::from_query("hello", Some("ctx"))).is_none());
}
