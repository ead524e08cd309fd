//! API cache facade
//!
//! Typed get/set/delete over one named cache connection, plus read-through
//! helpers and prefix invalidation.
//!
//! `get_or_set` is best-effort: concurrent callers that miss on the same
//! key each run their computation and each overwrite the entry. Callers that
//! need at most one computation per key use `get_or_set_locked`, which takes
//! a short-lived lease on the key through the backend first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::cache::pattern::contains_glob;
use crate::domain::cache::CacheBackend;
use crate::domain::DomainError;
use crate::infrastructure::cache::CacheRegistry;
use crate::infrastructure::metrics::{self, LookupResult};

use super::memoize::Memoized;

/// Connection used when none is named
pub const DEFAULT_CONNECTION: &str = "api_cache";

/// Expiry used when callers have no better value
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const LEASE_SUFFIX: &str = ":lease";

/// Settings for the per-key lease taken by `get_or_set_locked`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaseConfig {
    /// Lease lifetime; a crashed holder blocks others for at most this long
    #[serde(default = "default_lease_ttl_secs")]
    pub ttl_secs: u64,
    /// Delay between checks while another caller holds the lease
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up waiting and compute without the lease after this long
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_lease_ttl_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_max_wait_ms() -> u64 {
    5_000
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lease_ttl_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl LeaseConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs().max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis() as u64;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Facade over one named cache connection
///
/// The connection is resolved once, at construction. Cloning is cheap and
/// clones share the connection.
#[derive(Debug, Clone)]
pub struct ApiCache {
    connection: String,
    backend: Arc<dyn CacheBackend>,
}

impl ApiCache {
    /// Resolves `connection` from the registry
    pub fn new(registry: &CacheRegistry, connection: &str) -> Result<Self, DomainError> {
        let backend = registry.connection(connection)?;

        Ok(Self {
            connection: connection.to_string(),
            backend,
        })
    }

    /// Wraps an already resolved backend
    pub fn from_backend(connection: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            connection: connection.into(),
            backend,
        }
    }

    /// Logical name of the connection this facade uses
    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Reads a value; `None` means the key is absent
    ///
    /// A stored JSON `null` is a hit, so `get::<Option<T>>` returns
    /// `Some(None)` for it.
    pub async fn get<V>(&self, key: &str) -> Result<Option<V>, DomainError>
    where
        V: DeserializeOwned,
    {
        let value = match self.backend.get_raw(key).await? {
            Some(data) => Some(serde_json::from_str(&data).map_err(|e| {
                DomainError::serialization(format!(
                    "Failed to deserialize cache value for '{}': {}",
                    key, e
                ))
            })?),
            None => None,
        };

        let result = LookupResult::from(value.is_some());
        metrics::record_lookup(&self.connection, result);
        debug!(connection = %self.connection, key, result = result.as_str(), "Cache lookup");

        Ok(value)
    }

    /// Writes a value, overwriting any existing entry
    pub async fn set<V>(&self, key: &str, value: &V, ttl: Duration) -> Result<(), DomainError>
    where
        V: Serialize + ?Sized,
    {
        let data = serde_json::to_string(value).map_err(|e| {
            DomainError::serialization(format!(
                "Failed to serialize cache value for '{}': {}",
                key, e
            ))
        })?;

        self.backend.set_raw(key, &data, ttl).await
    }

    /// Removes a key; returns whether it existed. Missing keys are not an error.
    pub async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        self.backend.delete(key).await
    }

    /// Returns the cached value or computes, stores and returns it
    ///
    /// `compute` only runs on a miss. No lock is taken: concurrent misses
    /// each compute and the last write wins.
    pub async fn get_or_set<V, F, Fut>(&self, key: &str, compute: F, ttl: Duration) -> Result<V, DomainError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.try_get_or_set(key, move || async move { Ok::<V, DomainError>(compute().await) }, ttl)
            .await
    }

    /// `get_or_set` for fallible computations
    ///
    /// A computation error is returned as is and nothing is stored.
    pub async fn try_get_or_set<V, E, F, Fut>(&self, key: &str, compute: F, ttl: Duration) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned,
        E: From<DomainError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get::<V>(key).await? {
            return Ok(value);
        }

        metrics::record_compute(&self.connection);
        let value = compute().await?;
        self.set(key, &value, ttl).await?;

        Ok(value)
    }

    /// Read-through with at most one computation per key at a time
    ///
    /// The caller that wins the lease computes and stores the value. Others
    /// poll for it until `max_wait`, then compute without the lease.
    pub async fn get_or_set_locked<V, F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Duration,
        lease: &LeaseConfig,
    ) -> Result<V, DomainError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get::<V>(key).await? {
            return Ok(value);
        }

        let lease_key = format!("{}{}", key, LEASE_SUFFIX);
        let token = serde_json::to_string(&Uuid::new_v4().to_string())?;
        let deadline = Instant::now() + lease.max_wait();

        loop {
            if self.backend.set_nx_raw(&lease_key, &token, lease.ttl()).await? {
                debug!(connection = %self.connection, key, "Lease acquired");

                let outcome = self.fill_under_lease(key, compute, ttl).await;
                self.release_lease(&lease_key, &token).await;
                return outcome;
            }

            tokio::time::sleep(lease.poll_interval()).await;

            if let Some(value) = self.get::<V>(key).await? {
                return Ok(value);
            }

            if Instant::now() >= deadline {
                warn!(
                    connection = %self.connection,
                    key,
                    waited_ms = lease.max_wait_ms,
                    "Lease still held by another caller, computing without it"
                );

                metrics::record_compute(&self.connection);
                let value = compute().await;
                self.set(key, &value, ttl).await?;
                return Ok(value);
            }
        }
    }

    async fn fill_under_lease<V, F, Fut>(&self, key: &str, compute: F, ttl: Duration) -> Result<V, DomainError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        // The previous holder may have stored the value after our first read
        if let Some(value) = self.get::<V>(key).await? {
            return Ok(value);
        }

        metrics::record_compute(&self.connection);
        let value = compute().await;
        self.set(key, &value, ttl).await?;

        Ok(value)
    }

    // Only deletes the lease if it still carries our token. The lease TTL
    // covers the case where this fails.
    async fn release_lease(&self, lease_key: &str, token: &str) {
        match self.backend.get_raw(lease_key).await {
            Ok(Some(current)) if current == token => {
                if let Err(e) = self.backend.delete(lease_key).await {
                    warn!(connection = %self.connection, lease_key, error = %e, "Failed to release lease");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %self.connection, lease_key, error = %e, "Failed to check lease");
            }
        }
    }

    /// Deletes every key containing `prefix`, in one batch
    ///
    /// Needs a backend that can enumerate keys; others fail with a
    /// configuration error. Irreversible.
    pub async fn clear_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        if prefix.is_empty() {
            return Err(DomainError::validation(
                "clear_prefix needs a non-empty prefix; an empty one matches every key",
            ));
        }

        let scanner = self.backend.scanner().ok_or_else(|| {
            DomainError::configuration(format!(
                "Cache connection '{}' ({}) does not support key scanning required by clear_prefix",
                self.connection,
                self.backend.backend_name()
            ))
        })?;

        let pattern = contains_glob(prefix);
        let keys = scanner.scan_keys(&pattern).await?;

        if keys.is_empty() {
            debug!(connection = %self.connection, prefix, "No keys to clear");
            return Ok(0);
        }

        let deleted = scanner.delete_many(&keys).await?;

        info!(
            connection = %self.connection,
            prefix,
            matched = keys.len(),
            deleted,
            "Cleared cache keys by prefix"
        );
        metrics::record_prefix_clear(&self.connection, deleted);

        Ok(deleted)
    }

    /// Wraps `func` so its results are cached by call signature
    pub fn memoize<F>(&self, prefix: impl Into<String>, ttl: Duration, func: F) -> Memoized<F> {
        Memoized::new(self.clone(), prefix, ttl, func)
    }
}
