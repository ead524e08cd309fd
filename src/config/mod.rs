mod app_config;

pub use app_config::{ApiCacheSettings, AppConfig, Environment, LogFormat, LoggingConfig};
