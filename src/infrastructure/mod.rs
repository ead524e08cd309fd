//! Infrastructure layer - cache backends and the services built on them

pub mod cache;
pub mod logging;
pub mod metrics;
pub mod services;
