use thiserror::Error;

/// Errors raised by the cache subsystem.
///
/// Only configuration errors ever reach callers of the public cache API.
/// Remote tier failures are absorbed at the client boundary (see
/// [`RemoteError`]) and capacity pressure is always resolved by eviction.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown eviction policy: {0} (expected one of lru, fifo, lfu, random, ttl_aware)")]
    InvalidPolicy(String),

    #[error("Unknown cache type: {0} (expected local or hybrid)")]
    InvalidCacheType(String),

    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

impl CacheError {
    /// Create a new Config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Failures talking to the remote (L2) tier.
///
/// These never escape [`crate::remote::RedisTier`]; they are logged and
/// translated into a miss or a no-op.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis pool creation failed: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Remote operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed cache record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
pub type RemoteResult<T> = Result<T, RemoteError>;
