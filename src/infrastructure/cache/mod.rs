//! Cache infrastructure - backend implementations and named connections

mod dummy;
mod factory;
mod in_memory;
mod redis;
mod registry;

pub use dummy::DummyCache;
pub use factory::{CacheConfig, CacheFactory, CacheType};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use self::redis::{RedisCache, RedisCacheConfig};
pub use registry::CacheRegistry;
