use anyhow::Result;
use chatcache::{CacheStats, ResponseCache};
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::output::print_value;

pub async fn stats(cache: &ResponseCache, format: OutputFormat) -> Result<()> {
    let stats = cache.stats().await;
    if matches!(format, OutputFormat::Table) {
        print_summary(&stats);
    }
    print_value(&stats, format)
}

fn print_summary(stats: &CacheStats) {
    println!("{}: {}", "Mode".cyan(), stats.mode);
    println!(
        "{}: {} / {}",
        "Entries".cyan(),
        stats.entries,
        stats.max_entries
    );
    println!("{}: {:.1}%", "Hit rate".cyan(), stats.hit_rate);
    println!(
        "{}: {:.2} MB ({:.1}% of budget)",
        "Memory".cyan(),
        stats.memory_mb,
        stats.memory_percent
    );
    if let Some(remote) = &stats.remote {
        let state = if remote.available {
            "available".green()
        } else {
            "degraded".red()
        };
        println!("{}: {} ({})", "Remote".cyan(), remote.stats.backend, state);
        if let Some(entries) = remote.stats.entries {
            println!(
                "{}: {} / {}",
                "Remote entries".cyan(),
                entries,
                remote.stats.max_entries
            );
        }
    }
}
