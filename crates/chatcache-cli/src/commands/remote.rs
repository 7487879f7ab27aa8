use anyhow::{Result, bail};
use chatcache::ResponseCache;
use colored::Colorize;
use std::time::Instant;

use super::require_remote;
use crate::cli::OutputFormat;
use crate::output::print_value;

pub async fn ping(cache: &ResponseCache) -> Result<()> {
    let remote = require_remote(cache)?;
    let started = Instant::now();
    if remote.ping().await {
        println!(
            "{} {} is {} ({} ms)",
            "✓".green(),
            remote.name().cyan(),
            "reachable".green(),
            started.elapsed().as_millis()
        );
        Ok(())
    } else {
        bail!("{} did not answer within the configured timeout", remote.name())
    }
}

pub async fn keys(cache: &ResponseCache, format: OutputFormat) -> Result<()> {
    let remote = require_remote(cache)?;
    let keys: Vec<String> = remote.keys().await.iter().map(|k| k.to_string()).collect();
    if matches!(format, OutputFormat::Table) {
        for key in &keys {
            println!("{key}");
        }
        println!("{}: {}", "Total".cyan(), keys.len());
        Ok(())
    } else {
        print_value(&keys, format)
    }
}

pub async fn enforce(cache: &ResponseCache, format: OutputFormat) -> Result<()> {
    let remote = require_remote(cache)?;
    if !remote.ping().await {
        bail!("{} is unreachable", remote.name());
    }
    let report = remote.enforce_limits().await;
    print_value(&report, format)
}
