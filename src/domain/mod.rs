//! Domain layer - cache keys, backend contracts and errors

pub mod cache;
pub mod error;

pub use cache::{CacheBackend, DigestAlgorithm, KeyDeriver, SupportsScan, derive_key};
pub use error::DomainError;
