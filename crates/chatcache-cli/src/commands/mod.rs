pub mod config;
pub mod entries;
pub mod remote;
pub mod stats;

use anyhow::{Result, bail};
use chatcache::{AppConfig, RemoteStore, ResponseCache};
use std::sync::Arc;

/// Build the configured cache without background tasks.
pub async fn open_cache(config: &AppConfig) -> Result<ResponseCache> {
    Ok(chatcache::build_response_cache(config).await?)
}

/// The remote tier of a hybrid cache.
///
/// A local-only cache lives inside one process, so there is nothing for a
/// separate tool to inspect.
pub fn require_remote(cache: &ResponseCache) -> Result<&Arc<dyn RemoteStore>> {
    match cache {
        ResponseCache::Hybrid(hybrid) => Ok(hybrid.remote()),
        ResponseCache::Local(_) => bail!(
            "this command needs the shared tier; set cache.cache_type = \"hybrid\" (or CACHE_TYPE=hybrid)"
        ),
    }
}
