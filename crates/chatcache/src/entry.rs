//! Cached response model and its remote wire representation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Fixed per-entry bookkeeping cost added to every size estimate.
pub const ENTRY_OVERHEAD_BYTES: usize = 128;

/// Where a cached answer came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseSource {
    KnowledgeBase,
    Model,
    Static,
    Other(String),
}

impl ResponseSource {
    pub fn as_str(&self) -> &str {
        match self {
            ResponseSource::KnowledgeBase => "knowledge_base",
            ResponseSource::Model => "model",
            ResponseSource::Static => "static",
            ResponseSource::Other(label) => label,
        }
    }
}

impl From<&str> for ResponseSource {
    fn from(label: &str) -> Self {
        match label {
            "knowledge_base" => ResponseSource::KnowledgeBase,
            "model" => ResponseSource::Model,
            "static" => ResponseSource::Static,
            other => ResponseSource::Other(other.to_string()),
        }
    }
}

impl From<String> for ResponseSource {
    fn from(label: String) -> Self {
        ResponseSource::from(label.as_str())
    }
}

impl From<ResponseSource> for String {
    fn from(source: ResponseSource) -> Self {
        match source {
            ResponseSource::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful lookup hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub value: String,
    pub source: ResponseSource,
}

/// A cached answer with access metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub created_at: OffsetDateTime,
    pub access_count: u64,
    pub last_accessed_at: OffsetDateTime,
    pub source: ResponseSource,
}

impl CacheEntry {
    pub fn new(value: impl Into<String>, source: ResponseSource) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            value: value.into(),
            created_at: now,
            access_count: 0,
            last_accessed_at: now,
            source,
        }
    }

    /// `now - created_at > ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        elapsed_nanos(self.created_at) > ttl.as_nanos() as i128
    }

    /// Time left before the entry expires, zero once expired.
    pub fn remaining_ttl(&self, ttl: Duration) -> Duration {
        let left = ttl.as_nanos() as i128 - elapsed_nanos(self.created_at);
        if left <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(left.min(u64::MAX as i128) as u64)
        }
    }

    /// Record a hit.
    pub fn touch(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = OffsetDateTime::now_utc();
    }

    /// Approximate memory footprint: value and source bytes plus a fixed overhead.
    pub fn estimated_size(&self) -> usize {
        self.value.len() + self.source.as_str().len() + ENTRY_OVERHEAD_BYTES
    }

    pub fn to_response(&self) -> CachedResponse {
        CachedResponse {
            value: self.value.clone(),
            source: self.source.clone(),
        }
    }
}

fn elapsed_nanos(since: OffsetDateTime) -> i128 {
    (OffsetDateTime::now_utc() - since).whole_nanoseconds()
}

/// Record stored in the remote tier.
///
/// Timestamps are serialized as (fractional) epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedCacheEntry {
    pub value: String,
    #[serde(with = "epoch_seconds")]
    pub created_at: OffsetDateTime,
    pub access_count: u64,
    #[serde(with = "epoch_seconds")]
    pub last_accessed_at: OffsetDateTime,
    pub source: ResponseSource,
    pub node_id: String,
}

impl DistributedCacheEntry {
    pub fn from_entry(entry: &CacheEntry, node_id: impl Into<String>) -> Self {
        Self {
            value: entry.value.clone(),
            created_at: entry.created_at,
            access_count: entry.access_count,
            last_accessed_at: entry.last_accessed_at,
            source: entry.source.clone(),
            node_id: node_id.into(),
        }
    }

    pub fn into_entry(self) -> CacheEntry {
        CacheEntry {
            value: self.value,
            created_at: self.created_at,
            access_count: self.access_count,
            last_accessed_at: self.last_accessed_at,
            source: self.source,
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        elapsed_nanos(self.created_at) > ttl.as_nanos() as i128
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

mod epoch_seconds {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(dt: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(dt.unix_timestamp_nanos() as f64 / 1e9)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() {
            return Err(de::Error::custom("timestamp is not a finite number"));
        }
        OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128).map_err(de::Error::custom)
    }
}
