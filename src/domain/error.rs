use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Backend unavailable: {backend} - {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns true when the error came from the cache backend itself
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error() {
        let error = DomainError::serialization("key must be a string");
        assert_eq!(error.to_string(), "Serialization error: key must be a string");
    }

    #[test]
    fn test_backend_unavailable_error() {
        let error = DomainError::backend_unavailable("redis", "connection refused");
        assert_eq!(
            error.to_string(),
            "Backend unavailable: redis - connection refused"
        );
        assert!(error.is_backend_unavailable());
    }

    #[test]
    fn test_configuration_error() {
        let error = DomainError::configuration("Unknown cache connection: 'sessions'");
        assert_eq!(
            error.to_string(),
            "Configuration error: Unknown cache connection: 'sessions'"
        );
        assert!(!error.is_backend_unavailable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<i32>("not json").unwrap_err();
        let error: DomainError = err.into();
        assert!(matches!(error, DomainError::Serialization { .. }));
    }
}
