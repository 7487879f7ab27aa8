//! Eviction policies.

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;
use crate::error::CacheError;

/// Rule used to choose which entry leaves the cache when it is over budget.
///
/// Selected once when the store is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum EvictionPolicy {
    /// Least recently accessed entry first
    #[default]
    Lru,
    /// Oldest inserted entry first, regardless of access
    Fifo,
    /// Smallest access count first, least recently used among ties
    Lfu,
    /// Uniformly random entry
    Random,
    /// Entry closest to expiry first
    TtlAware,
}

/// Position of an entry in the eviction order. The smallest rank goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Rank {
    primary: i128,
    seq: u64,
}

impl EvictionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Random => "random",
            EvictionPolicy::TtlAware => "ttl_aware",
        }
    }

    /// Whether a hit moves the entry within the eviction order.
    pub(crate) fn reorders_on_access(&self) -> bool {
        matches!(self, EvictionPolicy::Lru | EvictionPolicy::Lfu)
    }

    /// Rank of `entry` given its insertion sequence number and the sequence
    /// number of its latest access. `None` for policies without an ordering
    /// index.
    ///
    /// Every entry shares one TTL, so the soonest to expire is the one created
    /// first.
    pub(crate) fn rank(&self, entry: &CacheEntry, insert_seq: u64, touch_seq: u64) -> Option<Rank> {
        match self {
            EvictionPolicy::Lru => Some(Rank {
                primary: 0,
                seq: touch_seq,
            }),
            EvictionPolicy::Fifo => Some(Rank {
                primary: 0,
                seq: insert_seq,
            }),
            EvictionPolicy::Lfu => Some(Rank {
                primary: entry.access_count as i128,
                seq: touch_seq,
            }),
            EvictionPolicy::TtlAware => Some(Rank {
                primary: entry.created_at.unix_timestamp_nanos(),
                seq: insert_seq,
            }),
            EvictionPolicy::Random => None,
        }
    }
}

impl std::str::FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "fifo" => Ok(Self::Fifo),
            "lfu" => Ok(Self::Lfu),
            "random" => Ok(Self::Random),
            "ttl_aware" | "ttl-aware" => Ok(Self::TtlAware),
            other => Err(CacheError::InvalidPolicy(other.to_string())),
        }
    }
}

impl TryFrom<String> for EvictionPolicy {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvictionPolicy> for String {
    fn from(policy: EvictionPolicy) -> Self {
        policy.name().to_string()
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
