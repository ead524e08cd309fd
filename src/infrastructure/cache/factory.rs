//! Builds cache backends from connection settings

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::cache::CacheBackend;
use crate::domain::DomainError;

use super::dummy::DummyCache;
use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::redis::{RedisCache, RedisCacheConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// Process-local, scan-capable
    #[default]
    #[serde(alias = "inmemory", alias = "memory")]
    InMemory,
    /// Shared across processes, scan-capable
    Redis,
    /// Never stores anything
    Dummy,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::InMemory => "in_memory",
            CacheType::Redis => "redis",
            CacheType::Dummy => "dummy",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(CacheType::InMemory),
            "redis" => Ok(CacheType::Redis),
            "dummy" => Ok(CacheType::Dummy),
            other => Err(DomainError::configuration(format!(
                "Unknown cache backend '{}'. Expected one of: in_memory, redis, dummy",
                other
            ))),
        }
    }
}

/// Settings for one named connection, as found under `[caches.<name>]`
///
/// Fields that do not apply to the selected backend are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheType,
    /// Redis: server URL, required
    #[serde(default)]
    pub url: Option<String>,
    /// Redis: namespace prepended to every key
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// In-memory: entry limit
    #[serde(default)]
    pub max_capacity: Option<u64>,
    /// In-memory: idle eviction
    #[serde(default)]
    pub time_to_idle_secs: Option<u64>,
    /// Redis: how long to wait for the initial connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::of(CacheType::InMemory)
    }
}

impl CacheConfig {
    fn of(backend: CacheType) -> Self {
        Self {
            backend,
            url: None,
            key_prefix: None,
            max_capacity: None,
            time_to_idle_secs: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn in_memory() -> Self {
        Self::of(CacheType::InMemory)
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::of(CacheType::Redis)
        }
    }

    pub fn dummy() -> Self {
        Self::of(CacheType::Dummy)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle_secs = Some(tti.as_secs());
        self
    }
}

#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    pub fn new() -> Self {
        Self
    }

    /// Opens the backend described by `config`
    ///
    /// Redis connects eagerly, so an unreachable server fails here rather
    /// than on first use.
    pub async fn create(&self, config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, DomainError> {
        let backend: Arc<dyn CacheBackend> = match config.backend {
            CacheType::InMemory => Arc::new(Self::in_memory(config)),
            CacheType::Redis => Arc::new(Self::redis(config).await?),
            CacheType::Dummy => Arc::new(DummyCache::new()),
        };

        Ok(backend)
    }

    fn in_memory(config: &CacheConfig) -> InMemoryCache {
        let mut settings = InMemoryCacheConfig::default();

        if let Some(capacity) = config.max_capacity {
            settings = settings.with_max_capacity(capacity);
        }
        if let Some(secs) = config.time_to_idle_secs {
            settings = settings.with_time_to_idle(Duration::from_secs(secs));
        }

        InMemoryCache::with_config(settings)
    }

    async fn redis(config: &CacheConfig) -> Result<RedisCache, DomainError> {
        let url = config
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DomainError::configuration("redis backend requires 'url'"))?;

        let mut settings = RedisCacheConfig::new(url)
            .with_connection_timeout(Duration::from_secs(config.connect_timeout_secs));

        if let Some(prefix) = &config.key_prefix {
            settings = settings.with_key_prefix(prefix.clone());
        }

        RedisCache::new(settings).await
    }
}
