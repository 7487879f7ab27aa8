// Tracing setup with a reloadable level filter.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing_with_level(level: &str) {
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swap the level filter at runtime. No-op before initialization.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        if let Err(e) = handle.modify(|f| *f = EnvFilter::new(level)) {
            tracing::warn!(error = %e, level, "failed to apply logging level");
        }
    }
}
