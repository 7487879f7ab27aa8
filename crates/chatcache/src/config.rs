use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CacheError, CacheResult};
use crate::local::EvictionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    /// Redis (L2) configuration, only used when `cache.cache_type = "hybrid"`
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> CacheResult<()> {
        self.cache.validate()?;
        if self.cache.cache_type == CacheType::Hybrid {
            self.redis.validate()?;
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(CacheError::config(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Which cache variant the registry builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum CacheType {
    /// Single-instance: in-process cache only
    #[default]
    Local,
    /// Multi-instance: in-process L1 + Redis L2
    Hybrid,
}

impl std::str::FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(CacheError::InvalidCacheType(other.to_string())),
        }
    }
}

impl TryFrom<String> for CacheType {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CacheType> for String {
    fn from(cache_type: CacheType) -> Self {
        cache_type.to_string()
    }
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::Local => write!(f, "local"),
            CacheType::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Local (L1) cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub cache_type: CacheType,

    /// Maximum number of entries held in memory
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entry time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default)]
    pub eviction_policy: EvictionPolicy,

    /// Memory budget for cached entries, in megabytes
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,

    /// Grow/shrink `max_entries` based on observed utilization
    #[serde(default)]
    pub auto_scale: bool,

    /// Expired-entry sweep interval in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Fraction of the memory budget that memory-based eviction frees down to
    #[serde(default = "default_memory_target_ratio")]
    pub memory_target_ratio: f64,

    /// Auto-scale sampling interval in seconds
    #[serde(default = "default_auto_scale_interval_secs")]
    pub auto_scale_interval_secs: u64,

    /// Upper bound for auto-scaling. Defaults to 8x `max_entries`.
    #[serde(default)]
    pub auto_scale_max_entries: Option<usize>,

    #[serde(default = "default_scale_up_occupancy")]
    pub scale_up_occupancy: f64,

    /// Memory usage (fraction of budget) above which the cache never grows
    #[serde(default = "default_scale_up_memory_ceiling")]
    pub scale_up_memory_ceiling: f64,

    #[serde(default = "default_scale_down_occupancy")]
    pub scale_down_occupancy: f64,

    /// Identifier written into remote records. A random UUID when unset.
    #[serde(default)]
    pub node_id: Option<String>,
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_max_memory_mb() -> u64 {
    100
}

fn default_cleanup_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_memory_target_ratio() -> f64 {
    0.8
}

fn default_auto_scale_interval_secs() -> u64 {
    60
}

fn default_scale_up_occupancy() -> f64 {
    0.9
}

fn default_scale_up_memory_ceiling() -> f64 {
    0.7
}

fn default_scale_down_occupancy() -> f64 {
    0.5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::default(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            eviction_policy: EvictionPolicy::default(),
            max_memory_mb: default_max_memory_mb(),
            auto_scale: false,
            cleanup_interval_secs: default_cleanup_interval_secs(),
            memory_target_ratio: default_memory_target_ratio(),
            auto_scale_interval_secs: default_auto_scale_interval_secs(),
            auto_scale_max_entries: None,
            scale_up_occupancy: default_scale_up_occupancy(),
            scale_up_memory_ceiling: default_scale_up_memory_ceiling(),
            scale_down_occupancy: default_scale_down_occupancy(),
            node_id: None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_entries == 0 {
            return Err(CacheError::config("cache.max_entries must be > 0"));
        }
        if self.ttl_secs == 0 {
            return Err(CacheError::config("cache.ttl_secs must be > 0"));
        }
        if self.max_memory_mb == 0 {
            return Err(CacheError::config("cache.max_memory_mb must be > 0"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(CacheError::config("cache.cleanup_interval_secs must be > 0"));
        }
        if self.auto_scale_interval_secs == 0 {
            return Err(CacheError::config(
                "cache.auto_scale_interval_secs must be > 0",
            ));
        }
        for (name, ratio) in [
            ("memory_target_ratio", self.memory_target_ratio),
            ("scale_up_occupancy", self.scale_up_occupancy),
            ("scale_up_memory_ceiling", self.scale_up_memory_ceiling),
            ("scale_down_occupancy", self.scale_down_occupancy),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(CacheError::config(format!(
                    "cache.{name} must be in (0, 1], got {ratio}"
                )));
            }
        }
        if self.scale_down_occupancy >= self.scale_up_occupancy {
            return Err(CacheError::config(
                "cache.scale_down_occupancy must be < cache.scale_up_occupancy",
            ));
        }
        if let Some(ceiling) = self.auto_scale_max_entries {
            if ceiling < self.max_entries {
                return Err(CacheError::config(
                    "cache.auto_scale_max_entries must be >= cache.max_entries",
                ));
            }
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize).saturating_mul(1024 * 1024)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn auto_scale_interval(&self) -> Duration {
        Duration::from_secs(self.auto_scale_interval_secs)
    }

    pub fn auto_scale_ceiling(&self) -> usize {
        self.auto_scale_max_entries
            .unwrap_or_else(|| self.max_entries.saturating_mul(8))
    }
}

/// Redis configuration for the shared L2 tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Per-operation timeout in milliseconds (connect and command)
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Namespace prefix for every key written by the cache
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,

    /// Maximum number of entries kept in Redis
    #[serde(default = "default_redis_max_entries")]
    pub max_entries: usize,

    /// Memory budget for cache records in Redis, in megabytes
    #[serde(default = "default_redis_max_memory_mb")]
    pub max_memory_mb: u64,

    /// TTL applied to records in Redis, in seconds
    #[serde(default = "default_redis_ttl_secs")]
    pub ttl_secs: u64,

    /// Liveness probe interval in seconds
    #[serde(default = "default_redis_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// Remote limit enforcement interval in seconds
    #[serde(default = "default_redis_enforce_interval_secs")]
    pub enforce_interval_secs: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

fn default_redis_key_prefix() -> String {
    "chatcache".to_string()
}

fn default_redis_max_entries() -> usize {
    10000
}

fn default_redis_max_memory_mb() -> u64 {
    256
}

fn default_redis_ttl_secs() -> u64 {
    7200 // 2 hours
}

fn default_redis_health_check_interval_secs() -> u64 {
    30
}

fn default_redis_enforce_interval_secs() -> u64 {
    300
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: default_redis_key_prefix(),
            max_entries: default_redis_max_entries(),
            max_memory_mb: default_redis_max_memory_mb(),
            ttl_secs: default_redis_ttl_secs(),
            health_check_interval_secs: default_redis_health_check_interval_secs(),
            enforce_interval_secs: default_redis_enforce_interval_secs(),
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> CacheResult<()> {
        if self.url.trim().is_empty() {
            return Err(CacheError::config("redis.url must not be empty"));
        }
        if self.pool_size == 0 {
            return Err(CacheError::config("redis.pool_size must be > 0"));
        }
        if self.timeout_ms == 0 {
            return Err(CacheError::config("redis.timeout_ms must be > 0"));
        }
        if self.max_entries == 0 {
            return Err(CacheError::config("redis.max_entries must be > 0"));
        }
        if self.max_memory_mb == 0 {
            return Err(CacheError::config("redis.max_memory_mb must be > 0"));
        }
        if self.ttl_secs == 0 {
            return Err(CacheError::config("redis.ttl_secs must be > 0"));
        }
        if self.health_check_interval_secs == 0 || self.enforce_interval_secs == 0 {
            return Err(CacheError::config("redis intervals must be > 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn enforce_interval(&self) -> Duration {
        Duration::from_secs(self.enforce_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{AppConfig, CacheType};
    use crate::error::{CacheError, CacheResult};
    use crate::local::EvictionPolicy;
    use config::{Config, ConfigError, Environment, File};
    use std::path::PathBuf;
    use std::str::FromStr;

    /// Flat environment variables recognized by deployments, mapped onto
    /// their nested configuration keys.
    pub const FLAT_ENV_OVERRIDES: &[(&str, &str)] = &[
        ("CACHE_TYPE", "cache.cache_type"),
        ("CACHE_MAX_SIZE", "cache.max_entries"),
        ("CACHE_TTL", "cache.ttl_secs"),
        ("CACHE_EVICTION_POLICY", "cache.eviction_policy"),
        ("CACHE_MAX_MEMORY_MB", "cache.max_memory_mb"),
        ("CACHE_AUTO_SCALE", "cache.auto_scale"),
        ("CACHE_CLEANUP_INTERVAL", "cache.cleanup_interval_secs"),
        ("REDIS_URL", "redis.url"),
        ("REDIS_MAX_SIZE", "redis.max_entries"),
        ("REDIS_TTL", "redis.ttl_secs"),
    ];

    /// Load configuration from an optional TOML file, then
    /// `CHATCACHE__SECTION__KEY` variables, then the flat variables in
    /// [`FLAT_ENV_OVERRIDES`]. The result is validated.
    pub fn load_config(path: Option<&str>) -> CacheResult<AppConfig> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("chatcache.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., CHATCACHE__CACHE__MAX_ENTRIES=5000
        builder = builder.add_source(
            Environment::with_prefix("CHATCACHE")
                .try_parsing(true)
                .separator("__"),
        );
        for (var, key) in FLAT_ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }
        let built = builder.build()?;
        check_named::<EvictionPolicy>(&built, "cache.eviction_policy")?;
        check_named::<CacheType>(&built, "cache.cache_type")?;
        let merged: AppConfig = built.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    /// Parse a named setting up front so an unknown name surfaces as its own
    /// error instead of a generic deserialization failure.
    fn check_named<T>(config: &Config, key: &str) -> CacheResult<()>
    where
        T: FromStr<Err = CacheError>,
    {
        match config.get_string(key) {
            Ok(value) => value.parse::<T>().map(|_| ()),
            Err(ConfigError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.cache.max_entries, 1000);
        assert_eq!(cfg.cache.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(cfg.cache.max_memory_bytes(), 100 * 1024 * 1024);
        assert_eq!(cfg.cache.auto_scale_ceiling(), 8000);
    }

    #[test]
    fn rejects_non_positive_limits() {
        let mut cfg = CacheConfig::default();
        cfg.max_entries = 0;
        assert!(matches!(cfg.validate(), Err(CacheError::Config(_))));

        let mut cfg = CacheConfig::default();
        cfg.memory_target_ratio = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn redis_checked_only_for_hybrid() {
        let mut cfg = AppConfig::default();
        cfg.redis.url = String::new();
        assert!(cfg.validate().is_ok());

        cfg.cache.cache_type = CacheType::Hybrid;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cache_type_from_str() {
        assert_eq!("Hybrid".parse::<CacheType>().unwrap(), CacheType::Hybrid);
        assert!(matches!(
            "cluster".parse::<CacheType>(),
            Err(CacheError::InvalidCacheType(_))
        ));
    }
}
