//! Infrastructure services

mod api_cache;
mod memoize;

pub use api_cache::{ApiCache, DEFAULT_CONNECTION, DEFAULT_TIMEOUT, LeaseConfig};
pub use memoize::Memoized;
