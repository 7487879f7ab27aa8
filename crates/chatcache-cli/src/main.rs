mod cli;
mod commands;
mod output;

use anyhow::Result;
use chatcache::CacheError;
use chatcache::config::loader::load_config;
use clap::Parser;

use cli::{Cli, Commands, ConfigCommands};
use output::{print_error, print_warning};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(exit_code(&e));
    }
}

/// 2 for configuration errors, 1 for everything else.
fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<CacheError>().is_some() {
        2
    } else {
        1
    }
}

async fn run() -> Result<()> {
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => print_warning(&format!("ignoring .env: {e}")),
        _ => {}
    }

    let cli = Cli::parse();
    chatcache::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("warn"));
    let format = cli.format.unwrap_or_default();
    let config = load_config(cli.config.as_deref())?;
    if cli.log_level.is_none() {
        chatcache::observability::apply_logging_level(&config.logging.level);
    }

    match &cli.command {
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => commands::config::show(&config)?,
            ConfigCommands::Check => commands::config::check(&config, cli.config.as_deref()),
        },
        Commands::Key(args) => commands::entries::key(args, format)?,
        Commands::Stats => {
            let cache = commands::open_cache(&config).await?;
            commands::stats::stats(&cache, format).await?;
        }
        Commands::Ping => {
            let cache = commands::open_cache(&config).await?;
            commands::remote::ping(&cache).await?;
        }
        Commands::Keys => {
            let cache = commands::open_cache(&config).await?;
            commands::remote::keys(&cache, format).await?;
        }
        Commands::Enforce => {
            let cache = commands::open_cache(&config).await?;
            commands::remote::enforce(&cache, format).await?;
        }
        Commands::Get(args) => {
            let cache = commands::open_cache(&config).await?;
            commands::entries::get(cache, args, format).await?;
        }
        Commands::Put(args) => {
            let cache = commands::open_cache(&config).await?;
            commands::entries::put(cache, args).await?;
        }
        Commands::Invalidate(args) => {
            let cache = commands::open_cache(&config).await?;
            commands::entries::invalidate(cache, args).await?;
        }
        Commands::Clear(args) => {
            let cache = commands::open_cache(&config).await?;
            commands::entries::clear(cache, args.yes).await?;
        }
    }

    Ok(())
}
