//! Cache backend traits
//!
//! Values cross this boundary as JSON text so the traits stay
//! dyn-compatible. The typed API lives on the facade.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Key/value operations every cache connection supports
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Gets a raw JSON value from the cache
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a raw JSON value in the cache with a TTL, overwriting any entry
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Sets a value only if the key doesn't exist
    ///
    /// The default is a read followed by a write and is not atomic.
    /// Backends that can do better override it.
    async fn set_nx_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        if self.get_raw(key).await?.is_some() {
            Ok(false)
        } else {
            self.set_raw(key, value, ttl).await?;
            Ok(true)
        }
    }

    /// Deletes a value, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Short backend name used in logs and errors
    fn backend_name(&self) -> &'static str;

    /// Key enumeration capability, if this backend has it
    fn scanner(&self) -> Option<&dyn SupportsScan> {
        None
    }
}

/// Key enumeration by glob pattern
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SupportsScan: Send + Sync {
    /// Returns every key matching the glob pattern
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, DomainError>;

    /// Deletes the given keys in one batch, returning how many existed
    async fn delete_many(&self, keys: &[String]) -> Result<usize, DomainError>;
}
