//! Error types for the continual policy core
//!
//! Every failure that crosses a component boundary is one of these
//! variants. Contract violations from the routed entry point are *not*
//! errors: they are reported as [`crate::invocation::RouteOutcome::Violation`].

use thiserror::Error;

use crate::collaborators::ModelError;
use crate::store::StoreError;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// A contract id outside the registered set was requested
    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    /// The backing schema document for a registered contract could not be loaded
    #[error("Schema unavailable for contract '{contract_id}': {message}")]
    SchemaUnavailable { contract_id: String, message: String },

    /// Model output never satisfied the contract schema
    #[error("Contract violation for '{contract_id}' after {attempts} attempt(s): {details}")]
    ContractViolation {
        contract_id: String,
        attempts: u32,
        details: String,
    },

    /// A proposed policy update is structurally malformed
    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    /// Rollback or lookup index is out of range
    #[error("Policy version {index} not found ({available} committed)")]
    VersionNotFound { index: usize, available: usize },

    /// The injected model capability failed
    #[error("Model invocation failed: {0}")]
    Model(#[from] ModelError),

    /// A test, judge or proposal collaborator failed
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// A collaborator exceeded the configured deadline
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    CollaboratorTimeout {
        collaborator: &'static str,
        timeout_ms: u64,
    },

    /// Policy storage failure other than a missing version
    #[error("Storage error: {0}")]
    Storage(String),

    /// Deployment input or configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Create a collaborator failure
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        CoreError::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Create an invalid rule set error
    pub fn invalid_rule_set(msg: impl Into<String>) -> Self {
        CoreError::InvalidRuleSet(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        CoreError::Config(msg.into())
    }

    /// Stable code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::UnknownContract(_) => "UNKNOWN_CONTRACT",
            CoreError::SchemaUnavailable { .. } => "SCHEMA_UNAVAILABLE",
            CoreError::ContractViolation { .. } => "CONTRACT_VIOLATION",
            CoreError::InvalidRuleSet(_) => "INVALID_RULE_SET",
            CoreError::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            CoreError::Model(_) => "MODEL_ERROR",
            CoreError::Collaborator { .. } => "COLLABORATOR_ERROR",
            CoreError::CollaboratorTimeout { .. } => "COLLABORATOR_TIMEOUT",
            CoreError::Storage(_) => "STORAGE_ERROR",
            CoreError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Check if this error was caused by the caller's input (vs the deployment)
    pub fn is_user_error(&self) -> bool {
        matches!(self, CoreError::VersionNotFound { .. })
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionNotFound { index, available } => {
                CoreError::VersionNotFound { index, available }
            }
            other => CoreError::Storage(other.to_string()),
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
