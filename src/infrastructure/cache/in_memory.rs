//! In-memory cache backend using moka

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};

use crate::domain::cache::pattern::glob_to_regex;
use crate::domain::cache::{CacheBackend, SupportsScan};
use crate::domain::DomainError;

const BACKEND: &str = "in_memory";

#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Entry count at which moka starts evicting
    pub max_capacity: u64,
    /// Evict entries nobody has read for this long
    pub time_to_idle: Option<Duration>,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

impl InMemoryCacheConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle = Some(tti);
        self
    }
}

#[derive(Debug, Clone)]
struct Entry {
    json: String,
    expires_at: Instant,
}

impl Entry {
    fn new(json: &str, ttl: Duration) -> Self {
        Self {
            json: json.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Process-local cache
///
/// Each entry carries its own deadline; expired entries read as absent and
/// are dropped lazily. Capacity and idle eviction are left to moka.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    entries: MokaCache<String, Entry>,
    config: InMemoryCacheConfig,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let builder = MokaCache::builder().max_capacity(config.max_capacity);
        let builder = match config.time_to_idle {
            Some(tti) => builder.time_to_idle(tti),
            None => builder,
        };

        Self {
            entries: builder.build(),
            config,
        }
    }

    pub fn config(&self) -> &InMemoryCacheConfig {
        &self.config
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        let Some(entry) = self.entries.get(key).await else {
            return Ok(None);
        };

        if entry.is_live() {
            Ok(Some(entry.json))
        } else {
            self.entries.invalidate(key).await;
            Ok(None)
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl)).await;
        Ok(())
    }

    async fn set_nx_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let fresh = Entry::new(value, ttl);

        // Runs under moka's per-key lock, so only one caller can insert
        let outcome = self
            .entries
            .entry(key.to_string())
            .and_compute_with(|current| {
                let op = match current {
                    Some(existing) if existing.value().is_live() => Op::Nop,
                    _ => Op::Put(fresh),
                };
                std::future::ready(op)
            })
            .await;

        Ok(matches!(outcome, CompResult::Inserted(_) | CompResult::ReplacedWith(_)))
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self
            .entries
            .remove(key)
            .await
            .is_some_and(|entry| entry.is_live()))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn scanner(&self) -> Option<&dyn SupportsScan> {
        Some(self)
    }
}

#[async_trait]
impl SupportsScan for InMemoryCache {
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, DomainError> {
        let matcher = glob_to_regex(pattern)?;

        self.entries.run_pending_tasks().await;

        // moka's iterator is synchronous
        let entries = self.entries.clone();
        let mut keys = tokio::task::spawn_blocking(move || {
            entries
                .iter()
                .filter(|(key, entry)| entry.is_live() && matcher.is_match(key.as_str()))
                .map(|(key, _)| key.as_str().to_string())
                .collect::<Vec<String>>()
        })
        .await
        .map_err(|e| DomainError::backend_unavailable(BACKEND, format!("key scan aborted: {}", e)))?;

        keys.sort_unstable();
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, DomainError> {
        let mut removed = 0;

        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }

        Ok(removed)
    }
}
