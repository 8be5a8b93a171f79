//! Error types for Stevedore
//!
//! This module provides the error taxonomy for all registry operations.
//! All errors implement the standard Error trait and carry enough context
//! for the caller to decide between surfacing, retrying after login, or
//! treating the failure as a configuration problem.

use thiserror::Error;


/// Main error type for Stevedore operations
#[derive(Error, Debug)]
pub enum StevedoreError {
    /// Bad reference syntax. Never retried, surfaced verbatim to the caller.
    #[error("Invalid repository name: {message}")]
    InvalidRepositoryName { message: String },

    /// Security policy violation: a registry configured as secure would
    /// require a plaintext connection. Never silently downgraded.
    #[error("insecure-registry: {message}")]
    InsecureRegistry { message: String },

    /// A v2-only operation was invoked against a v1 endpoint, or vice
    /// versa. Programming error, fatal to the call.
    #[error("Incorrect API version for endpoint: {message}")]
    IncorrectApiVersion { message: String },

    /// The registry answered 401. Callers may prompt for credentials and
    /// retry the whole operation once.
    #[error("Authentication is required")]
    LoginRequired,

    /// Unknown checksum algorithm label (configuration error, distinct
    /// from corrupt input data).
    #[error("Checksum type not supported: {name}")]
    SumTypeNotSupported { name: String },

    /// Any other non-2xx registry response.
    #[error("Registry error (status: {status_code}): {message}")]
    RegistryHttp { message: String, status_code: u16 },

    /// Network-related errors (connection, timeout, DNS)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors (checksum mismatch, malformed wire body, etc.)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors (invalid config file, bad mirror URL)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Stevedore operations
pub type Result<T> = std::result::Result<T, StevedoreError>;

impl StevedoreError {
    /// Creates a new invalid-repository-name error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::error::StevedoreError;
    ///
    /// let err = StevedoreError::invalid_repository_name("uppercase not allowed");
    /// assert!(matches!(err, StevedoreError::InvalidRepositoryName { .. }));
    /// ```
    pub fn invalid_repository_name<S: Into<String>>(message: S) -> Self {
        Self::InvalidRepositoryName {
            message: message.into(),
        }
    }

    /// Creates a new insecure-registry error.
    pub fn insecure_registry<S: Into<String>>(message: S) -> Self {
        Self::InsecureRegistry {
            message: message.into(),
        }
    }

    /// Creates a new incorrect-API-version error.
    pub fn incorrect_api_version<S: Into<String>>(message: S) -> Self {
        Self::IncorrectApiVersion {
            message: message.into(),
        }
    }

    /// Creates a new unsupported-checksum-type error.
    pub fn sum_type_not_supported<S: Into<String>>(name: S) -> Self {
        Self::SumTypeNotSupported { name: name.into() }
    }

    /// Creates a new registry HTTP error from a response status.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::error::StevedoreError;
    ///
    /// let err = StevedoreError::registry_http("Server error: 500 fetching tags", 500);
    /// assert!(matches!(err, StevedoreError::RegistryHttp { status_code: 500, .. }));
    /// ```
    pub fn registry_http<S: Into<String>>(message: S, status_code: u16) -> Self {
        Self::RegistryHttp {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new network error.
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new network error with a source error.
    pub fn network_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new validation error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::error::StevedoreError;
    ///
    /// let err = StevedoreError::validation("checksum mismatch");
    /// assert!(matches!(err, StevedoreError::Validation { .. }));
    /// ```
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new validation error with a source error.
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S, path: Option<S>) -> Self {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: None,
        }
    }

    /// Creates a new configuration error with a source error.
    pub fn config_with_source<S, E>(message: S, path: Option<S>, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: Some(Box::new(source)),
        }
    }

    /// True when the error should be surfaced as a login prompt.
    pub fn is_login_required(&self) -> bool {
        matches!(self, Self::LoginRequired)
    }
}

impl From<config::ConfigError> for StevedoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::config_with_source("Failed to process configuration", None, err)
    }
}
