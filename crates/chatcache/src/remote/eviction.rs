//! Eviction planning for the remote tier, driven by the metadata stored in
//! each record.

use rand::seq::SliceRandom;

use crate::entry::DistributedCacheEntry;
use crate::local::EvictionPolicy;

/// A record loaded from the remote store together with its storage key and
/// serialized size.
#[derive(Debug, Clone)]
pub struct RemoteRecord {
    pub storage_key: String,
    pub entry: DistributedCacheEntry,
    pub size: usize,
}

/// Storage keys to delete, split by the limit that selected them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub by_count: Vec<String>,
    pub by_memory: Vec<String>,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.by_count.is_empty() && self.by_memory.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.by_count.iter().chain(self.by_memory.iter())
    }
}

/// Decide which records to drop so that at most `max_entries` remain and,
/// if their serialized size exceeds `max_bytes`, it falls to
/// `target_ratio * max_bytes`.
pub fn plan_eviction(
    mut records: Vec<RemoteRecord>,
    policy: EvictionPolicy,
    max_entries: usize,
    max_bytes: u64,
    target_ratio: f64,
) -> EvictionPlan {
    sort_for_eviction(&mut records, policy);

    let mut plan = EvictionPlan::default();
    let mut remaining_bytes: u64 = records.iter().map(|r| r.size as u64).sum();
    let mut victims = records.into_iter();

    let excess = victims.len().saturating_sub(max_entries);
    for record in victims.by_ref().take(excess) {
        remaining_bytes = remaining_bytes.saturating_sub(record.size as u64);
        plan.by_count.push(record.storage_key);
    }

    if remaining_bytes > max_bytes {
        let target = (max_bytes as f64 * target_ratio) as u64;
        for record in victims {
            if remaining_bytes <= target {
                break;
            }
            remaining_bytes = remaining_bytes.saturating_sub(record.size as u64);
            plan.by_memory.push(record.storage_key);
        }
    }

    plan
}

fn sort_for_eviction(records: &mut [RemoteRecord], policy: EvictionPolicy) {
    match policy {
        EvictionPolicy::Lru => records.sort_by_key(|r| r.entry.last_accessed_at),
        EvictionPolicy::Fifo | EvictionPolicy::TtlAware => {
            records.sort_by_key(|r| r.entry.created_at)
        }
        EvictionPolicy::Lfu => {
            records.sort_by_key(|r| (r.entry.access_count, r.entry.last_accessed_at))
        }
        EvictionPolicy::Random => records.shuffle(&mut rand::thread_rng()),
    }
}
