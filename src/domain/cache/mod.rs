//! Cache domain - key derivation and the backend abstraction

mod backend;
mod key;
pub mod pattern;

pub use backend::{CacheBackend, SupportsScan};
pub use key::{DEFAULT_FRAGMENT_LENGTH, DigestAlgorithm, KeyDeriver, canonical_text, derive_key};

#[cfg(test)]
pub use backend::MockSupportsScan;
#[cfg(test)]
pub use backend::mock::MockCache;
