use std::{env, fs};

use chatcache::config::loader::load_config;
use chatcache::{CacheError, CacheType, EvictionPolicy};

// Environment variables are process-global, so every case runs in one test.
#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("chatcache.toml");

    let toml_content = r#"
[cache]
cache_type = "hybrid"
max_entries = 500
ttl_secs = 600
eviction_policy = "lfu"
max_memory_mb = 64
auto_scale = true

[redis]
url = "redis://cache.internal:6379"
key_prefix = "support-bot"
ttl_secs = 1800

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.cache.cache_type, CacheType::Hybrid);
    assert_eq!(cfg.cache.max_entries, 500);
    assert_eq!(cfg.cache.eviction_policy, EvictionPolicy::Lfu);
    assert!(cfg.cache.auto_scale);
    assert_eq!(cfg.redis.key_prefix, "support-bot");
    assert_eq!(cfg.redis.max_entries, 10_000);
    assert_eq!(cfg.logging.level, "debug");

    // 2) Nested env override wins over the file
    unsafe {
        env::set_var("CHATCACHE__CACHE__MAX_ENTRIES", "750");
    }
    let cfg_env = load_config(path.to_str()).expect("nested env override");
    assert_eq!(cfg_env.cache.max_entries, 750);

    // 3) Flat deployment variables win over both
    unsafe {
        env::set_var("CACHE_MAX_SIZE", "2000");
        env::set_var("CACHE_EVICTION_POLICY", "fifo");
        env::set_var("REDIS_TTL", "60");
    }
    let cfg_flat = load_config(path.to_str()).expect("flat env override");
    assert_eq!(cfg_flat.cache.max_entries, 2000);
    assert_eq!(cfg_flat.cache.eviction_policy, EvictionPolicy::Fifo);
    assert_eq!(cfg_flat.redis.ttl_secs, 60);

    // 4) Policy and cache type names are matched case-insensitively
    unsafe {
        env::set_var("CACHE_EVICTION_POLICY", "LRU");
        env::set_var("CACHE_TYPE", "Local");
    }
    let cfg_upper = load_config(path.to_str()).expect("upper-case names");
    assert_eq!(cfg_upper.cache.eviction_policy, EvictionPolicy::Lru);
    assert_eq!(cfg_upper.cache.cache_type, CacheType::Local);

    unsafe {
        env::set_var("CACHE_EVICTION_POLICY", "ttl-aware");
    }
    let cfg_dashed = load_config(path.to_str()).expect("dashed policy name");
    assert_eq!(cfg_dashed.cache.eviction_policy, EvictionPolicy::TtlAware);

    // 5) Unknown names are fatal and reported as such
    unsafe {
        env::set_var("CACHE_EVICTION_POLICY", "mru");
    }
    let err = load_config(path.to_str()).expect_err("unknown policy");
    assert!(matches!(&err, CacheError::InvalidPolicy(name) if name == "mru"));

    unsafe {
        env::set_var("CACHE_EVICTION_POLICY", "fifo");
        env::set_var("CACHE_TYPE", "cluster");
    }
    let err = load_config(path.to_str()).expect_err("unknown cache type");
    assert!(matches!(&err, CacheError::InvalidCacheType(name) if name == "cluster"));

    unsafe {
        env::remove_var("CHATCACHE__CACHE__MAX_ENTRIES");
        env::remove_var("CACHE_MAX_SIZE");
        env::remove_var("CACHE_EVICTION_POLICY");
        env::remove_var("CACHE_TYPE");
        env::remove_var("REDIS_TTL");
    }

    // 6) Out-of-range values fail validation
    let invalid_path = dir.path().join("invalid.toml");
    fs::write(
        &invalid_path,
        "[cache]\nmax_entries = 0\n",
    )
    .expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(matches!(err, CacheError::Config(_)));
    assert!(err.to_string().contains("max_entries must be > 0"));

    // 7) Missing file falls back to defaults
    let defaults = load_config(dir.path().join("absent.toml").to_str()).expect("defaults");
    assert_eq!(defaults.cache.cache_type, CacheType::Local);
    assert_eq!(defaults.cache.ttl_secs, 3600);
}
