//! Propagation error types
//!
//! One taxonomy for the whole engine. Validation failures are never retried,
//! timeouts are reported apart from other connector failures so callers can
//! apply their own retry policy.

use thiserror::Error;

use xavyo_connector::error::ConnectorError;

use crate::cipher::CipherError;
use crate::mapping::MappingError;
use crate::password::InvalidPolicyError;
use crate::store::StoreError;
use crate::task::ExecutionStatus;

/// Errors raised by the propagation engine.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// Mandatory attributes are missing or empty on a create.
    #[error("Not attempted because there are mandatory attributes without value(s): {attributes:?}")]
    Validation { attributes: Vec<String> },

    /// The password policies applicable to the subject cannot be satisfied.
    #[error("Invalid password policy: {0}")]
    InvalidPolicy(#[from] InvalidPolicyError),

    /// The connector did not answer in time.
    #[error("Remote timeout on {resource}")]
    RemoteTimeout {
        resource: String,
        #[source]
        source: ConnectorError,
    },

    /// Any other connector failure.
    #[error("Remote operation failed on {resource}")]
    RemoteOperation {
        resource: String,
        #[source]
        source: ConnectorError,
    },

    /// A virtual attribute was read with no cached value and no pending change.
    #[error("Virtual attribute '{schema}' of {subject} has no cached value and no pending change")]
    CacheConsistency { subject: String, schema: String },

    /// The resource's mapping is missing or malformed.
    #[error("Invalid mapping: {0}")]
    Mapping(#[from] MappingError),

    /// No connector is registered for the resource.
    #[error("Connector not found for resource {resource}")]
    ConnectorNotFound { resource: String },

    /// A `before` action declared fatal rejected the propagation.
    #[error("Propagation action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    /// Execution status transition not allowed by the state machine.
    #[error("Invalid execution status transition from {from} to {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Persistence collaborator failure.
    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    /// Stored password could not be decoded.
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
}

impl PropagationError {
    /// Wrap a connector error, keeping timeouts apart.
    pub fn from_connector(resource: impl Into<String>, source: ConnectorError) -> Self {
        let resource = resource.into();
        if source.is_timeout() {
            PropagationError::RemoteTimeout { resource, source }
        } else {
            PropagationError::RemoteOperation { resource, source }
        }
    }

    /// Whether the caller may retry the failed propagation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PropagationError::RemoteTimeout { .. })
    }

    /// Whether this is a timeout signal from the connector.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PropagationError::RemoteTimeout { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            PropagationError::Validation { .. } => "VALIDATION_ERROR",
            PropagationError::InvalidPolicy(_) => "INVALID_POLICY",
            PropagationError::RemoteTimeout { .. } => "REMOTE_TIMEOUT",
            PropagationError::RemoteOperation { .. } => "REMOTE_OPERATION_ERROR",
            PropagationError::CacheConsistency { .. } => "CACHE_CONSISTENCY_ERROR",
            PropagationError::Mapping(_) => "MAPPING_ERROR",
            PropagationError::ConnectorNotFound { .. } => "CONNECTOR_NOT_FOUND",
            PropagationError::ActionFailed { .. } => "ACTION_FAILED",
            PropagationError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PropagationError::Store(_) => "STORE_ERROR",
            PropagationError::Cipher(_) => "CIPHER_ERROR",
        }
    }

    /// Short failure reason: the message, plus the first line of the
    /// underlying cause when there is one.
    pub fn short_reason(&self) -> String {
        let message = self.to_string();
        match std::error::Error::source(self) {
            Some(cause) => {
                let cause = cause.to_string();
                let first_line = cause.lines().next().unwrap_or_default();
                format!("{message}\n\n Cause: {first_line}")
            }
            None => message,
        }
    }

    /// Full diagnostic trace: the whole error chain, one level per line.
    pub fn diagnostic(&self) -> String {
        let mut trace = format!("{} [{}]", self, self.error_code());
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            current = cause.source();
        }
        trace
    }
}

/// Result type for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;
