//! API cache
//!
//! Response caching for API handlers and other expensive calls:
//! - Deterministic keys derived from a prefix and call arguments
//! - Typed get/set/delete and read-through `get_or_set` over named cache
//!   connections (in-memory, Redis, or a no-op cache)
//! - Bulk invalidation by prefix on backends that can enumerate keys
//! - Memoization of async functions

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{DomainError, KeyDeriver, derive_key};
pub use infrastructure::services::{ApiCache, LeaseConfig, Memoized};

use std::collections::HashMap;

use infrastructure::cache::CacheRegistry;
use tracing::info;

/// Opens every configured connection and returns the facade for the
/// configured API cache connection
pub async fn create_api_cache(config: &AppConfig) -> anyhow::Result<ApiCache> {
    let registry = CacheRegistry::from_config(&config.caches).await?;
    info!(connections = registry.len(), "Cache registry initialized");

    Ok(ApiCache::new(&registry, &config.api_cache.connection)?)
}

/// Opens only `connection` and returns a facade over it
pub async fn create_api_cache_for(config: &AppConfig, connection: &str) -> anyhow::Result<ApiCache> {
    let caches: HashMap<String, _> = config
        .caches
        .iter()
        .filter(|(name, _)| name.as_str() == connection)
        .map(|(name, cache)| (name.clone(), cache.clone()))
        .collect();

    if caches.is_empty() {
        let mut names: Vec<&str> = config.caches.keys().map(String::as_str).collect();
        names.sort_unstable();

        return Err(DomainError::configuration(format!(
            "Unknown cache connection: '{}'. Configured connections: [{}]",
            connection,
            names.join(", ")
        ))
        .into());
    }

    let registry = CacheRegistry::from_config(&caches).await?;
    Ok(ApiCache::new(&registry, connection)?)
}
