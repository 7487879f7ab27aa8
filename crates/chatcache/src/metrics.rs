//! Prometheus metrics for the response cache.
//!
//! Recording is a no-op until a recorder is installed, so library users that
//! do not call [`init_metrics`] pay nothing beyond the macro calls.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
    pub const CACHE_MEMORY_BYTES: &str = "cache_memory_bytes";
    pub const CACHE_MAX_ENTRIES: &str = "cache_max_entries";
    pub const CACHE_REMOTE_ERRORS_TOTAL: &str = "cache_remote_errors_total";
    pub const CACHE_REMOTE_AVAILABLE: &str = "cache_remote_available";
}

#[cfg(feature = "prometheus")]
mod exporter {
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use std::sync::OnceLock;

    /// Global Prometheus handle for rendering metrics.
    static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    /// Install the Prometheus recorder.
    ///
    /// Returns `true` if initialization succeeded, `false` if already initialized.
    pub fn init_metrics() -> bool {
        if PROMETHEUS_HANDLE.get().is_some() {
            tracing::debug!("Prometheus metrics already initialized");
            return false;
        }

        // Pull-based: the embedding service serves the rendered text itself
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                if PROMETHEUS_HANDLE.set(handle).is_err() {
                    tracing::warn!("Failed to store Prometheus handle (already set)");
                    return false;
                }
                tracing::info!("Prometheus metrics initialized");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Prometheus recorder");
                false
            }
        }
    }

    /// Render all metrics in Prometheus text format.
    ///
    /// Returns `None` if metrics were not initialized.
    pub fn render_metrics() -> Option<String> {
        PROMETHEUS_HANDLE.get().map(|handle| handle.render())
    }
}

#[cfg(feature = "prometheus")]
pub use exporter::{init_metrics, render_metrics};

/// Record a cache hit on the given tier ("L1" or "L2").
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record evictions by cause ("count_limit", "memory_limit", "ttl").
pub fn record_evictions(cause: &'static str, count: usize) {
    if count > 0 {
        counter!(names::CACHE_EVICTIONS_TOTAL, "cause" => cause).increment(count as u64);
    }
}

/// Publish the local tier's size gauges.
pub fn set_local_usage(entries: usize, memory_bytes: usize, max_entries: usize) {
    gauge!(names::CACHE_ENTRIES, "tier" => "L1").set(entries as f64);
    gauge!(names::CACHE_MEMORY_BYTES, "tier" => "L1").set(memory_bytes as f64);
    gauge!(names::CACHE_MAX_ENTRIES, "tier" => "L1").set(max_entries as f64);
}

/// Record a failed remote operation.
pub fn record_remote_error(operation: &'static str) {
    counter!(names::CACHE_REMOTE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

pub fn set_remote_available(available: bool) {
    gauge!(names::CACHE_REMOTE_AVAILABLE).set(if available { 1.0 } else { 0.0 });
}
