use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::infrastructure::cache::CacheConfig;
use crate::infrastructure::services::{DEFAULT_CONNECTION, DEFAULT_TIMEOUT, LeaseConfig};

/// Environment variable selecting the environment overlay
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named cache connections
    #[serde(default = "default_caches")]
    pub caches: HashMap<String, CacheConfig>,
    #[serde(default)]
    pub api_cache: ApiCacheSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Reads `APP_ENV`, defaulting to development when unset
    pub fn from_env() -> Result<Self, config::ConfigError> {
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::default()),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(config::ConfigError::Message(format!(
                "Unknown environment '{}'. Valid environments: development, production",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings for the API cache facade
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiCacheSettings {
    /// Cache connection the facade uses
    #[serde(default = "default_connection")]
    pub connection: String,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub lease: LeaseConfig,
}

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_caches() -> HashMap<String, CacheConfig> {
    HashMap::from([
        ("default".to_string(), CacheConfig::in_memory()),
        (DEFAULT_CONNECTION.to_string(), CacheConfig::in_memory()),
    ])
}

impl ApiCacheSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for ApiCacheSettings {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            default_timeout_secs: default_timeout_secs(),
            lease: LeaseConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            logging: LoggingConfig::default(),
            caches: default_caches(),
            api_cache: ApiCacheSettings::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads `config/default`, the `APP_ENV` overlay, `config/local`, then
    /// `APP__` environment variables, later sources winning
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(Path::new("config"), Environment::from_env()?)
    }

    pub fn load_from(dir: &Path, environment: Environment) -> Result<Self, config::ConfigError> {
        let file = |name: &str| {
            config::File::with_name(&dir.join(name).to_string_lossy()).required(false)
        };

        let config = config::Config::builder()
            .add_source(file("default"))
            .add_source(file(environment.as_str()))
            .add_source(file("local"))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override("environment", environment.as_str())?
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::CacheType;

    fn from_toml(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.api_cache.connection, "api_cache");
        assert_eq!(config.api_cache.default_timeout(), Duration::from_secs(300));
        assert!(config.caches.contains_key("default"));
        assert!(config.caches.contains_key("api_cache"));
    }

    #[test]
    fn test_deserialize_caches_and_api_cache() {
        let config = from_toml(
            r#"
            environment = "production"

            [logging]
            level = "debug"
            format = "json"

            [caches.api_cache]
            backend = "redis"
            url = "redis://cache:6379/1"
            key_prefix = "api"

            [api_cache]
            default_timeout_secs = 120

            [api_cache.lease]
            max_wait_ms = 1000
            "#,
        );

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.logging.format, LogFormat::Json);

        let api = &config.caches["api_cache"];
        assert_eq!(api.backend, CacheType::Redis);
        assert_eq!(api.key_prefix.as_deref(), Some("api"));

        assert_eq!(config.api_cache.connection, "api_cache");
        assert_eq!(config.api_cache.default_timeout_secs, 120);
        assert_eq!(config.api_cache.lease.max_wait_ms, 1000);
        assert_eq!(config.api_cache.lease.ttl_secs, 10);
    }

    #[test]
    fn test_caches_default_when_section_missing() {
        let config = from_toml("[logging]\nlevel = \"warn\"\nformat = \"pretty\"\n");

        assert_eq!(config.caches.len(), 2);
        assert_eq!(config.caches["api_cache"].backend, CacheType::InMemory);
    }

    #[test]
    fn test_partial_logging_section() {
        let config = from_toml("[logging]\nlevel = \"debug\"\n");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);

        let config = from_toml("[logging]\nformat = \"json\"\n");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_load_from_missing_directory_uses_defaults() {
        let config =
            AppConfig::load_from(Path::new("does-not-exist"), Environment::Production).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.api_cache.connection, "api_cache");
    }
}
