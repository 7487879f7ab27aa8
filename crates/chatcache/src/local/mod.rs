//! In-process (L1) cache engine.
//!
//! ## Limits
//!
//! The store is bounded twice, and both bounds hold after every `set`:
//!
//! - **Entry count**: before a new key lands in a full store, one entry is
//!   evicted at a time until there is room.
//! - **Memory**: when the estimated footprint would exceed the budget, a batch
//!   of entries is evicted so usage drops to `memory_target_ratio` (80% by
//!   default) of the budget. The gap keeps the store from evicting on every
//!   insert once it is full.
//!
//! ## Eviction Order
//!
//! | Policy | Victim |
//! |--------|--------|
//! | `lru` | oldest last access |
//! | `fifo` | oldest insertion |
//! | `lfu` | lowest access count |
//! | `random` | uniform sample |
//! | `ttl_aware` | closest to expiry |
//!
//! Ordered policies keep a `BTreeMap` index next to the entries, updated on
//! insert and on every hit, so picking a victim is `O(log n)`.
//!
//! ## Background Work
//!
//! [`LocalCache::start_background_tasks`] spawns an expiry sweeper and, with
//! `auto_scale = true`, a monitor that doubles or halves `max_entries`
//! depending on occupancy, memory use and host memory pressure.

mod autoscale;
mod engine;
mod policy;
mod store;

pub use autoscale::{
    AutoScalePolicy, AutoScaleStats, FixedMemoryPressure, MemoryPressureProbe, ProcMeminfoProbe,
    ScaleDecision,
};
pub use engine::{LocalCache, LocalStats};
pub use policy::EvictionPolicy;
pub use store::{EvictionCause, EvictionCounts};
