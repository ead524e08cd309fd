//! Named cache connections
//!
//! Built once at process start from configuration and handed to every
//! facade by reference. Facades look connections up by logical name
//! ("default", "api_cache", ...) when they are constructed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::cache::CacheBackend;
use crate::domain::DomainError;

use super::factory::{CacheConfig, CacheFactory};

#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    connections: BTreeMap<String, Arc<dyn CacheBackend>>,
}

impl CacheRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens every configured connection
    ///
    /// Fails on the first connection that cannot be created.
    pub async fn from_config(caches: &HashMap<String, CacheConfig>) -> Result<Self, DomainError> {
        let factory = CacheFactory::new();
        let mut registry = Self::new();

        for (name, config) in caches {
            let backend = factory.create(config).await.map_err(|e| match e {
                DomainError::Configuration { message } => DomainError::configuration(format!(
                    "Cache connection '{}': {}",
                    name, message
                )),
                other => other,
            })?;

            tracing::info!(
                connection = %name,
                backend = backend.backend_name(),
                "Cache connection ready"
            );

            registry.connections.insert(name.clone(), backend);
        }

        Ok(registry)
    }

    /// Registers a backend under a name, replacing any previous one
    pub fn with_connection(mut self, name: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        self.connections.insert(name.into(), backend);
        self
    }

    /// Resolves a connection by name
    pub fn connection(&self, name: &str) -> Result<Arc<dyn CacheBackend>, DomainError> {
        self.connections.get(name).cloned().ok_or_else(|| {
            DomainError::configuration(format!(
                "Unknown cache connection: '{}'. Configured connections: [{}]",
                name,
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Configured connection names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Connection names paired with their backend type
    pub fn describe(&self) -> Vec<(&str, &'static str)> {
        self.connections
            .iter()
            .map(|(name, backend)| (name.as_str(), backend.backend_name()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
