//! Cache commands - operate on one configured connection

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde_json::Value;
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::cache::CacheRegistry;

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Cache connection name (defaults to the API cache connection)
    #[arg(long)]
    pub cache: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub key: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub key: String,

    /// Value as JSON
    pub value: String,

    /// Expiry in seconds (defaults to the configured timeout)
    #[arg(long)]
    pub ttl: Option<u64>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub key: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct ClearPrefixArgs {
    pub prefix: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn get(config: &AppConfig, args: GetArgs) -> anyhow::Result<()> {
    let cache = crate::create_api_cache_for(config, connection_name(config, &args.connection)).await?;

    match cache.get::<Value>(&args.key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("(miss)"),
    }

    Ok(())
}

pub async fn set(config: &AppConfig, args: SetArgs) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(&args.value).context("value is not valid JSON")?;
    let ttl = args
        .ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.api_cache.default_timeout());

    let cache = crate::create_api_cache_for(config, connection_name(config, &args.connection)).await?;
    cache.set(&args.key, &value, ttl).await?;

    info!(key = %args.key, ttl_secs = ttl.as_secs(), "Value stored");
    Ok(())
}

pub async fn delete(config: &AppConfig, args: DeleteArgs) -> anyhow::Result<()> {
    let cache = crate::create_api_cache_for(config, connection_name(config, &args.connection)).await?;
    let existed = cache.delete(&args.key).await?;

    println!("{}", if existed { "deleted" } else { "not found" });
    Ok(())
}

pub async fn clear_prefix(config: &AppConfig, args: ClearPrefixArgs) -> anyhow::Result<()> {
    let cache = crate::create_api_cache_for(config, connection_name(config, &args.connection)).await?;
    let deleted = cache.clear_prefix(&args.prefix).await?;

    println!("{}", deleted);
    Ok(())
}

pub async fn connections(config: &AppConfig) -> anyhow::Result<()> {
    let registry = CacheRegistry::from_config(&config.caches).await?;

    for (name, backend) in registry.describe() {
        let marker = if name == config.api_cache.connection { " (api_cache)" } else { "" };
        println!("{}\t{}{}", name, backend, marker);
    }

    Ok(())
}

fn connection_name<'a>(config: &'a AppConfig, args: &'a ConnectionArgs) -> &'a str {
    args.cache.as_deref().unwrap_or(&config.api_cache.connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_name_defaults_to_api_cache() {
        let config = AppConfig::default();

        let args = ConnectionArgs { cache: None };
        assert_eq!(connection_name(&config, &args), "api_cache");

        let args = ConnectionArgs { cache: Some("default".to_string()) };
        assert_eq!(connection_name(&config, &args), "default");
    }
}
