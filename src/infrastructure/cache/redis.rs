//! Redis cache backend
//!
//! Entries are plain Redis strings holding JSON text, written with a
//! millisecond expiry. An optional namespace is prepended to every key on the
//! way in and stripped from scanned keys on the way out, so callers only ever
//! see their own key space.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ExistenceCheck, SetExpiry, SetOptions};

use crate::domain::cache::pattern::escape_glob;
use crate::domain::cache::{CacheBackend, SupportsScan};
use crate::domain::DomainError;

const BACKEND: &str = "redis";

/// Connection settings for one Redis-backed cache
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// e.g. "redis://127.0.0.1:6379/0"
    pub url: String,
    pub key_prefix: Option<String>,
    pub connection_timeout: Duration,
    /// COUNT hint sent with each SCAN
    pub scan_count: usize,
}

impl RedisCacheConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: None,
            connection_timeout: Duration::from_secs(5),
            scan_count: 100,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }
}

/// Maps caller keys into the configured namespace and back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Namespace {
    prefix: Option<String>,
}

impl Namespace {
    fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    fn key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// The namespace itself is matched literally
    fn pattern(&self, pattern: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", escape_glob(prefix), pattern),
            None => pattern.to_string(),
        }
    }

    fn strip(&self, key: String) -> String {
        let Some(prefix) = &self.prefix else {
            return key;
        };

        match key.strip_prefix(prefix.as_str()).and_then(|rest| rest.strip_prefix(':')) {
            Some(rest) => rest.to_string(),
            None => key,
        }
    }
}

/// Cache stored in Redis, shared by every process pointing at the server
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    namespace: Namespace,
    config: RedisCacheConfig,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.config.url)
            .field("namespace", &self.namespace.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connects, failing if the server cannot be reached within the timeout
    pub async fn new(config: RedisCacheConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            DomainError::configuration(format!("Invalid Redis URL '{}': {}", config.url, e))
        })?;

        let connect = ConnectionManager::new(client);
        let connection = match tokio::time::timeout(config.connection_timeout, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(unavailable("connect", e)),
            Err(_) => {
                return Err(DomainError::backend_unavailable(
                    BACKEND,
                    format!("connect: no answer from {} within {:?}", config.url, config.connection_timeout),
                ));
            }
        };

        tracing::debug!(url = %config.url, prefix = ?config.key_prefix, "Redis cache connected");

        Ok(Self {
            connection,
            namespace: Namespace::new(config.key_prefix.clone()),
            config,
        })
    }

    pub fn config(&self) -> &RedisCacheConfig {
        &self.config
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn unavailable(op: &str, err: redis::RedisError) -> DomainError {
    DomainError::backend_unavailable(BACKEND, format!("{}: {}", op, err))
}

// PX keeps sub-second expiries; zero would be rejected by the server
fn expiry_millis(ttl: Duration) -> u64 {
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

fn expiry(ttl: Duration) -> SetExpiry {
    SetExpiry::PX(expiry_millis(ttl))
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        self.conn()
            .get(self.namespace.key(key))
            .await
            .map_err(|e| unavailable(&format!("GET {}", key), e))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let options = SetOptions::default().with_expiration(expiry(ttl));

        let _: () = self
            .conn()
            .set_options(self.namespace.key(key), value, options)
            .await
            .map_err(|e| unavailable(&format!("SET {}", key), e))?;

        Ok(())
    }

    async fn set_nx_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(expiry(ttl));

        // Nil reply when the key already exists
        let reply: Option<String> = self
            .conn()
            .set_options(self.namespace.key(key), value, options)
            .await
            .map_err(|e| unavailable(&format!("SET NX {}", key), e))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let removed: u64 = self
            .conn()
            .del(self.namespace.key(key))
            .await
            .map_err(|e| unavailable(&format!("DEL {}", key), e))?;

        Ok(removed > 0)
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn scanner(&self) -> Option<&dyn SupportsScan> {
        Some(self)
    }
}

#[async_trait]
impl SupportsScan for RedisCache {
    /// Walks the whole keyspace with SCAN; KEYS would block the server
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, DomainError> {
        let full_pattern = self.namespace.pattern(pattern);
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(self.config.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(|e| unavailable(&format!("SCAN {}", full_pattern), e))?;

            keys.extend(batch.into_iter().map(|k| self.namespace.strip(k)));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // A key can be reported by more than one SCAN page
        keys.sort_unstable();
        keys.dedup();

        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, DomainError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let full_keys: Vec<String> = keys.iter().map(|k| self.namespace.key(k)).collect();
        let removed: u64 = self
            .conn()
            .del(&full_keys)
            .await
            .map_err(|e| unavailable(&format!("DEL {} keys", full_keys.len()), e))?;

        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Live tests need a server on localhost: cargo test -- --ignored

    async fn live_cache() -> RedisCache {
        RedisCache::new(RedisCacheConfig::new("redis://127.0.0.1:6379").with_key_prefix("api-cache-test"))
            .await
            .unwrap()
    }

    #[test]
    fn test_namespace_key() {
        let ns = Namespace::new(Some("api".to_string()));
        assert_eq!(ns.key("sum:7d70d88da551"), "api:sum:7d70d88da551");

        let bare = Namespace::default();
        assert_eq!(bare.key("sum:7d70d88da551"), "sum:7d70d88da551");
    }

    #[test]
    fn test_namespace_pattern_escapes_prefix() {
        let ns = Namespace::new(Some("tenant[1]".to_string()));
        assert_eq!(ns.pattern("*users*"), "tenant\\[1\\]:*users*");
    }

    #[test]
    fn test_namespace_strip() {
        let ns = Namespace::new(Some("api".to_string()));
        assert_eq!(ns.strip("api:users:abc".to_string()), "users:abc");
        assert_eq!(ns.strip("other:users:abc".to_string()), "other:users:abc");
        assert_eq!(Namespace::default().strip("api:x".to_string()), "api:x");
    }

    #[test]
    fn test_expiry_keeps_milliseconds() {
        assert_eq!(expiry_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::MAX), u64::MAX);
        assert!(matches!(expiry(Duration::from_millis(250)), SetExpiry::PX(250)));
    }

    #[test]
    fn test_config_builder() {
        let config = RedisCacheConfig::new("redis://localhost")
            .with_key_prefix("")
            .with_scan_count(0)
            .with_connection_timeout(Duration::from_secs(1));

        assert_eq!(config.key_prefix, None);
        assert_eq!(config.scan_count, 1);
        assert_eq!(config.connection_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let result = RedisCache::new(RedisCacheConfig::new("not a url")).await;
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    #[ignore = "needs a Redis server"]
    async fn test_live_round_trip_and_set_nx() {
        let cache = live_cache().await;
        let ttl = Duration::from_secs(30);

        cache.set_raw("live:k", "\"v\"", ttl).await.unwrap();
        assert_eq!(cache.get_raw("live:k").await.unwrap().as_deref(), Some("\"v\""));

        assert!(!cache.set_nx_raw("live:k", "\"w\"", ttl).await.unwrap());
        assert!(cache.delete("live:k").await.unwrap());
        assert!(!cache.delete("live:k").await.unwrap());
        assert!(cache.set_nx_raw("live:k", "\"w\"", ttl).await.unwrap());

        cache.delete("live:k").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Redis server"]
    async fn test_live_scan_is_namespaced() {
        let cache = live_cache().await;
        let ttl = Duration::from_secs(30);

        cache.set_raw("scan:p:aaa", "1", ttl).await.unwrap();
        cache.set_raw("scan:p:bbb", "2", ttl).await.unwrap();
        cache.set_raw("scan:q:ccc", "3", ttl).await.unwrap();

        let keys = cache.scan_keys("*scan:p*").await.unwrap();
        assert_eq!(keys, vec!["scan:p:aaa", "scan:p:bbb"]);

        assert_eq!(cache.delete_many(&keys).await.unwrap(), 2);
        assert!(cache.get_raw("scan:q:ccc").await.unwrap().is_some());

        cache.delete("scan:q:ccc").await.unwrap();
    }
}
