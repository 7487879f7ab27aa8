use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "chatcache")]
#[command(about = "Inspect and manage the chat response cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML configuration file (defaults to ./chatcache.toml)
    #[arg(short, long, global = true, env = "CHATCACHE_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level for cache internals (overrides logging.level from the config)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show cache statistics
    Stats,
    /// Check that the remote tier answers
    Ping,
    /// Look up the cached answer for a query
    Get(QueryArgs),
    /// Store an answer for a query
    Put(PutArgs),
    /// Remove the cached answer for a query
    Invalidate(QueryArgs),
    /// Remove every cached answer in this cache's namespace
    Clear(ClearArgs),
    /// List keys held by the remote tier
    Keys,
    /// Apply the remote tier's entry and memory limits now
    Enforce,
    /// Print the derived cache key for a query
    Key(QueryArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct QueryArgs {
    /// Query text (normalized before hashing)
    pub query: String,
    /// Optional conversation context
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(clap::Args)]
pub struct PutArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// Answer to cache
    pub value: String,
    /// Provenance label (knowledge_base, model, static or any custom label)
    #[arg(long, default_value = "static")]
    pub source: String,
}

#[derive(clap::Args)]
pub struct ClearArgs {
    /// Skip the confirmation check
    #[arg(long)]
    pub yes: bool,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration as TOML
    Show,
    /// Validate the configuration and exit
    Check,
}
