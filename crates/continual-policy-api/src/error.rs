//! Error types for the service binary and its deployment collaborators

use continual_policy_core::CoreError;
use thiserror::Error;

/// Errors raised while configuring, starting or operating the service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Invalid arguments or request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file or environment error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Error from the policy core
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Metrics registration failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ServiceError::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ServiceError::Config(msg.into())
    }

    /// Whether the caller can fix this by changing their input
    pub fn is_user_error(&self) -> bool {
        match self {
            ServiceError::InvalidInput(_) | ServiceError::Config(_) => true,
            ServiceError::Core(err) => err.is_user_error(),
            _ => false,
        }
    }

    /// Whether this reports a missing policy version or file
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::FileError(_) | ServiceError::Core(CoreError::VersionNotFound { .. })
        )
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::FileError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
