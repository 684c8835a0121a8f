//! Error taxonomy for the coordination bus
//!
//! Validation and store-level failures are hard errors surfaced to the
//! caller; monitoring subsystems (detection, prediction, indexing) catch
//! their own failures at the boundary and must never crash the host.

use thiserror::Error;

/// Main error type for bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    #[error("Recovery exhausted for {category} after {attempts} attempts")]
    RecoveryExhausted { category: String, attempts: u32 },

    #[error("Specialization violation by {agent}: {detail}")]
    SpecializationViolation { agent: String, detail: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BusError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery<S: Into<String>>(message: S) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a specialization violation error
    pub fn specialization_violation<S: Into<String>, D: Into<String>>(agent: S, detail: D) -> Self {
        Self::SpecializationViolation {
            agent: agent.into(),
            detail: detail.into(),
        }
    }

    /// True for errors a caller may retry through the recovery catalog
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Delivery { .. } | BusError::Internal { .. })
    }
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;
