//! Cache that stores nothing
//!
//! Useful for switching caching off for one connection without touching
//! call sites: every read misses and every write succeeds. It cannot
//! enumerate keys, so `clear_prefix` fails against it.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::cache::CacheBackend;
use crate::domain::DomainError;

#[derive(Debug, Default, Clone, Copy)]
pub struct DummyCache;

impl DummyCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for DummyCache {
    async fn get_raw(&self, _key: &str) -> Result<Option<String>, DomainError> {
        Ok(None)
    }

    async fn set_raw(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), DomainError> {
        Ok(())
    }

    async fn set_nx_raw(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, DomainError> {
        Ok(true)
    }

    async fn delete(&self, _key: &str) -> Result<bool, DomainError> {
        Ok(false)
    }

    fn backend_name(&self) -> &'static str {
        "dummy"
    }
}
