//! Capacity auto-scaling for the local cache.

use serde::Serialize;

use crate::config::CacheConfig;

/// System memory used ratio above which the cache never grows.
const SYSTEM_PRESSURE_LIMIT: f64 = 0.8;

/// Reports how much of the host's memory is in use.
pub trait MemoryPressureProbe: Send + Sync {
    /// Used memory as a fraction in `[0, 1]`, `None` when unknown.
    fn used_ratio(&self) -> Option<f64>;
}

/// Reads `MemTotal` / `MemAvailable` from `/proc/meminfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMeminfoProbe;

impl MemoryPressureProbe for ProcMeminfoProbe {
    fn used_ratio(&self) -> Option<f64> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&meminfo)
    }
}

fn parse_meminfo(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(1.0 - available.min(total) as f64 / total as f64)
}

/// Probe returning a fixed reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryPressure(pub Option<f64>);

impl MemoryPressureProbe for FixedMemoryPressure {
    fn used_ratio(&self) -> Option<f64> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScaleDecision {
    Grow { from: usize, to: usize },
    Shrink { from: usize, to: usize },
    Hold,
}

/// Thresholds driving [`ScaleDecision`]s.
#[derive(Debug, Clone)]
pub struct AutoScalePolicy {
    pub original_max_entries: usize,
    pub ceiling: usize,
    pub scale_up_occupancy: f64,
    pub scale_up_memory_ceiling: f64,
    pub scale_down_occupancy: f64,
}

impl AutoScalePolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            original_max_entries: config.max_entries,
            ceiling: config.auto_scale_ceiling(),
            scale_up_occupancy: config.scale_up_occupancy,
            scale_up_memory_ceiling: config.scale_up_memory_ceiling,
            scale_down_occupancy: config.scale_down_occupancy,
        }
    }

    /// Grow when nearly full with memory to spare and a calm host; shrink
    /// back toward the configured size when mostly empty.
    pub fn decide(
        &self,
        current_max: usize,
        len: usize,
        memory_ratio: f64,
        system_used: Option<f64>,
    ) -> ScaleDecision {
        let occupancy = len as f64 / current_max.max(1) as f64;
        let system_calm = system_used.is_some_and(|used| used < SYSTEM_PRESSURE_LIMIT);

        if occupancy > self.scale_up_occupancy
            && memory_ratio < self.scale_up_memory_ceiling
            && system_calm
            && current_max < self.ceiling
        {
            let to = current_max.saturating_mul(2).min(self.ceiling);
            return ScaleDecision::Grow {
                from: current_max,
                to,
            };
        }

        if occupancy < self.scale_down_occupancy && current_max > self.original_max_entries {
            let to = (current_max / 2).max(self.original_max_entries);
            return ScaleDecision::Shrink {
                from: current_max,
                to,
            };
        }

        ScaleDecision::Hold
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoScaleStats {
    pub enabled: bool,
    pub original_max_entries: usize,
    pub current_max_entries: usize,
    pub ceiling: usize,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub last_decision: Option<ScaleDecision>,
}
