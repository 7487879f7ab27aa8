//! Bounded key/entry store with an incrementally maintained eviction index.
//!
//! The store is not synchronized; [`super::LocalCache`] keeps it behind a
//! single mutex together with its ordering index.

use indexmap::IndexMap;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::policy::{EvictionPolicy, Rank};
use crate::entry::{CacheEntry, CachedResponse};
use crate::key::CacheKey;

struct Slot {
    entry: CacheEntry,
    size: usize,
    insert_seq: u64,
    touch_seq: u64,
    rank: Option<Rank>,
}

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    CountLimit,
    MemoryLimit,
    Expired,
}

impl EvictionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionCause::CountLimit => "count_limit",
            EvictionCause::MemoryLimit => "memory_limit",
            EvictionCause::Expired => "ttl",
        }
    }
}

/// Eviction counters broken down by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionCounts {
    pub count_limit: u64,
    pub memory_limit: u64,
    pub ttl: u64,
    /// Inserts refused because the entry alone exceeds the memory budget
    pub rejected: u64,
}

impl EvictionCounts {
    pub fn total(&self) -> u64 {
        self.count_limit + self.memory_limit + self.ttl
    }

    fn record(&mut self, cause: EvictionCause, n: u64) {
        match cause {
            EvictionCause::CountLimit => self.count_limit += n,
            EvictionCause::MemoryLimit => self.memory_limit += n,
            EvictionCause::Expired => self.ttl += n,
        }
    }
}

pub(crate) enum Lookup {
    Hit(CachedResponse),
    Expired,
    Missing,
}

/// Result of a single insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct InsertOutcome {
    pub evicted_by_count: usize,
    pub evicted_by_memory: usize,
    pub rejected: bool,
}

pub(crate) struct Store {
    entries: IndexMap<CacheKey, Slot>,
    order: BTreeMap<Rank, CacheKey>,
    policy: EvictionPolicy,
    next_seq: u64,
    memory_bytes: usize,
    max_entries: usize,
    max_memory_bytes: usize,
    memory_target_ratio: f64,
    evictions: EvictionCounts,
}

impl Store {
    pub fn new(
        policy: EvictionPolicy,
        max_entries: usize,
        max_memory_bytes: usize,
        memory_target_ratio: f64,
    ) -> Self {
        Self {
            entries: IndexMap::new(),
            order: BTreeMap::new(),
            policy,
            next_seq: 0,
            memory_bytes: 0,
            max_entries,
            max_memory_bytes,
            memory_target_ratio,
            evictions: EvictionCounts::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_bytes
    }

    pub fn evictions(&self) -> EvictionCounts {
        self.evictions
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Look up `key`, touching it on a hit. Expired entries are dropped.
    pub fn get(&mut self, key: &CacheKey, ttl: Duration) -> Lookup {
        let expired = match self.entries.get(key) {
            None => return Lookup::Missing,
            Some(slot) => slot.entry.is_expired(ttl),
        };
        if expired {
            self.remove_slot(key);
            self.evictions.record(EvictionCause::Expired, 1);
            return Lookup::Expired;
        }

        let seq = self.bump_seq();
        let policy = self.policy;
        let Some(slot) = self.entries.get_mut(key) else {
            return Lookup::Missing;
        };
        slot.entry.touch();
        slot.touch_seq = seq;
        let response = slot.entry.to_response();
        if policy.reorders_on_access() {
            let new_rank = policy.rank(&slot.entry, slot.insert_seq, slot.touch_seq);
            let old_rank = std::mem::replace(&mut slot.rank, new_rank);
            if let Some(old) = old_rank {
                self.order.remove(&old);
            }
            if let Some(new) = new_rank {
                self.order.insert(new, key.clone());
            }
        }
        Lookup::Hit(response)
    }

    pub fn contains(&self, key: &CacheKey, ttl: Duration) -> bool {
        self.entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired(ttl))
    }

    /// Insert or replace `key`. Count and memory limits are enforced before
    /// the new entry lands, so both hold once this returns.
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        let size = entry.estimated_size();

        // A replacement never counts against the entry limit.
        self.remove_slot(&key);

        if size > self.max_memory_bytes {
            self.evictions.rejected += 1;
            outcome.rejected = true;
            return outcome;
        }

        while self.entries.len() >= self.max_entries {
            match self.pick_victim() {
                Some(victim) => {
                    self.remove_slot(&victim);
                    outcome.evicted_by_count += 1;
                }
                None => break,
            }
        }
        self.evictions
            .record(EvictionCause::CountLimit, outcome.evicted_by_count as u64);

        if self.memory_bytes + size > self.max_memory_bytes {
            let target = (self.max_memory_bytes as f64 * self.memory_target_ratio) as usize;
            let keep_at_most = target.saturating_sub(size);
            let to_free = self.memory_bytes.saturating_sub(keep_at_most);
            let batch = self.memory_victims(to_free);
            for victim in &batch {
                self.remove_slot(victim);
            }
            outcome.evicted_by_memory = batch.len();
            self.evictions
                .record(EvictionCause::MemoryLimit, batch.len() as u64);
        }

        let seq = self.bump_seq();
        let rank = self.policy.rank(&entry, seq, seq);
        if let Some(rank) = rank {
            self.order.insert(rank, key.clone());
        }
        self.memory_bytes += size;
        self.entries.insert(
            key,
            Slot {
                entry,
                size,
                insert_seq: seq,
                touch_seq: seq,
                rank,
            },
        );
        outcome
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.remove_slot(key).map(|slot| slot.entry)
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.order.clear();
        self.memory_bytes = 0;
        removed
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self, ttl: Duration) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove_slot(key);
        }
        self.evictions
            .record(EvictionCause::Expired, expired.len() as u64);
        expired.len()
    }

    /// Change the entry limit, evicting down to it if needed.
    pub fn set_max_entries(&mut self, max_entries: usize) -> usize {
        self.max_entries = max_entries.max(1);
        let mut evicted = 0;
        while self.entries.len() > self.max_entries {
            match self.pick_victim() {
                Some(victim) => {
                    self.remove_slot(&victim);
                    evicted += 1;
                }
                None => break,
            }
        }
        self.evictions
            .record(EvictionCause::CountLimit, evicted as u64);
        evicted
    }

    fn pick_victim(&self) -> Option<CacheKey> {
        match self.policy {
            EvictionPolicy::Random => {
                if self.entries.is_empty() {
                    return None;
                }
                let idx = rand::thread_rng().gen_range(0..self.entries.len());
                self.entries.get_index(idx).map(|(key, _)| key.clone())
            }
            _ => self.order.values().next().cloned(),
        }
    }

    /// Collect, in eviction order, enough entries to free `bytes`.
    fn memory_victims(&self, bytes: usize) -> Vec<CacheKey> {
        let mut freed = 0;
        let mut batch = Vec::new();
        let mut take = |key: &CacheKey| {
            if freed >= bytes {
                return false;
            }
            if let Some(slot) = self.entries.get(key) {
                freed += slot.size;
                batch.push(key.clone());
            }
            true
        };
        match self.policy {
            EvictionPolicy::Random => {
                let mut rng = rand::thread_rng();
                let len = self.entries.len();
                for idx in rand::seq::index::sample(&mut rng, len, len) {
                    if let Some((key, _)) = self.entries.get_index(idx) {
                        if !take(key) {
                            break;
                        }
                    }
                }
            }
            _ => {
                for key in self.order.values() {
                    if !take(key) {
                        break;
                    }
                }
            }
        }
        batch
    }

    fn remove_slot(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.entries.swap_remove(key)?;
        if let Some(rank) = slot.rank {
            self.order.remove(&rank);
        }
        self.memory_bytes = self.memory_bytes.saturating_sub(slot.size);
        Some(slot)
    }
}
