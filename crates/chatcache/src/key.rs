//! Cache key derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque, fixed-length identifier for a cached response.
///
/// Keys built with [`CacheKey::from_query`] hash the normalized query text
/// (trimmed, lower-cased) together with an optional context string, so
/// `"Hello "` and `"hello"` resolve to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from a user query and an optional context.
    pub fn from_query(query: &str, context: Option<&str>) -> Self {
        let normalized = normalize_query(query);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"|");
        hasher.update(context.unwrap_or_default().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-derived key (e.g. one read back from the remote tier).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim surrounding whitespace and lower-case the query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}
