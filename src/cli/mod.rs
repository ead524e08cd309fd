//! CLI for inspecting and maintaining API cache connections
//!
//! - `key`: print the key a call signature maps to
//! - `get` / `set` / `delete`: single-key access
//! - `clear-prefix`: bulk invalidation
//! - `connections`: list configured connections

pub mod cache;
pub mod key;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// API cache - response caching over named cache connections
#[derive(Parser)]
#[command(name = "api-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the cache key derived from a prefix and call arguments
    Key(key::KeyArgs),

    /// Read a cached value
    Get(cache::GetArgs),

    /// Store a JSON value
    Set(cache::SetArgs),

    /// Remove a key
    Delete(cache::DeleteArgs),

    /// Remove every key containing a prefix
    ClearPrefix(cache::ClearPrefixArgs),

    /// List configured cache connections
    Connections,
}

/// Loads configuration, initializes logging and dispatches the command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    logging::init_logging(&config.logging)?;

    match cli.command {
        Command::Key(args) => key::run(args),
        Command::Get(args) => cache::get(&config, args).await,
        Command::Set(args) => cache::set(&config, args).await,
        Command::Delete(args) => cache::delete(&config, args).await,
        Command::ClearPrefix(args) => cache::clear_prefix(&config, args).await,
        Command::Connections => cache::connections(&config).await,
    }
}
