//! Error types for pipe batching
//!
//! Includes error classification so the transport layer can tell an
//! encoding failure (the event could not be turned into bytes) apart from
//! lifecycle and configuration problems.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories for metrics and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Event or request could not be encoded/decoded
    Serialization,
    /// Invalid connector parameters
    Configuration,
    /// Operation not allowed in the current lifecycle state
    Lifecycle,
    /// I/O failure from an encoding collaborator
    Io,
}

/// Pipe batching errors
#[derive(Error, Debug)]
pub enum PipeError {
    /// Structured or canonical form failed to serialize
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Event could not provide any byte representation
    #[error("Payload unavailable: {0}")]
    PayloadUnavailable(String),

    /// Request decoding error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Encoded request exceeds the transport limit
    #[error("Request size {0} exceeds maximum {1}")]
    MessageTooLarge(usize, usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The accumulator has been closed
    #[error("Batch accumulator is closed")]
    Closed,

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipeError {
    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a new payload-unavailable error
    pub fn payload_unavailable(msg: impl Into<String>) -> Self {
        Self::PayloadUnavailable(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True if the failure happened while turning an event into bytes.
    ///
    /// An `intake` call that fails this way appended nothing.
    pub fn is_encoding_failure(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_) | Self::PayloadUnavailable(_) | Self::Io(_)
        )
    }

    /// Get the error category for metrics and alerting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::PayloadUnavailable(_) => ErrorCategory::Serialization,
            Self::Deserialization(_) => ErrorCategory::Serialization,
            Self::MessageTooLarge(_, _) => ErrorCategory::Serialization,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Closed => ErrorCategory::Lifecycle,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Get a metric-safe error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "serialization_error",
            Self::PayloadUnavailable(_) => "payload_unavailable",
            Self::Deserialization(_) => "deserialization_error",
            Self::MessageTooLarge(_, _) => "message_too_large",
            Self::Config(_) => "config_error",
            Self::Closed => "closed",
            Self::Io(_) => "io_error",
        }
    }
}

impl From<postcard::Error> for PipeError {
    fn from(e: postcard::Error) -> Self {
        PipeError::Serialization(e.to_string())
    }
}

/// Result type for pipe batching operations
pub type Result<T> = std::result::Result<T, PipeError>;
