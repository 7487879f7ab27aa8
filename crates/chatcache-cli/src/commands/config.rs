use anyhow::Result;
use chatcache::AppConfig;
use colored::Colorize;

use crate::output::print_success;

pub fn show(config: &AppConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Loading already validated the configuration; report what was checked.
pub fn check(config: &AppConfig, path: Option<&str>) {
    print_success(&format!(
        "configuration is valid ({})",
        path.unwrap_or("chatcache.toml + environment")
    ));
    println!("{}: {}", "Cache type".cyan(), config.cache.cache_type);
    println!("{}: {}", "Eviction policy".cyan(), config.cache.eviction_policy);
    println!(
        "{}: {} entries, {} MB, TTL {}s",
        "Local limits".cyan(),
        config.cache.max_entries,
        config.cache.max_memory_mb,
        config.cache.ttl_secs
    );
    if config.cache.cache_type == chatcache::CacheType::Hybrid {
        println!(
            "{}: {} entries, {} MB, TTL {}s, prefix {}",
            "Remote limits".cyan(),
            config.redis.max_entries,
            config.redis.max_memory_mb,
            config.redis.ttl_secs,
            config.redis.key_prefix
        );
    }
}
