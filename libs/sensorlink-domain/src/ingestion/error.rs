//! Domain errors for ingestion operations
//!
//! This module defines all possible errors that can occur while ingesting telemetry.
//! These are domain-level errors that abstract away infrastructure details.

use thiserror::Error;

/// Errors that can occur during telemetry ingestion
///
/// These errors represent business-level failures and are independent of
/// infrastructure implementation details (e.g., no AWS SDK or NATS error types here).
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The message payload is not a valid measurement record
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Failed to write the document in the storage backend
    #[error("Storage operation failed: {0}")]
    StorageFailure(String),

    /// The document was persisted but the source did not accept the acknowledgment
    #[error("Acknowledgment failed: {0}")]
    AckFailure(String),

    /// Pulling the next message from the source failed
    #[error("Message source failure: {0}")]
    SourceFailure(String),

    /// Could not establish a session with the source or the store
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl IngestionError {
    /// Create a malformed payload error with a message
    pub fn malformed_payload(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    /// Create a storage failure error with a message
    pub fn storage_failure(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    /// Create an acknowledgment failure error with a message
    pub fn ack_failure(msg: impl Into<String>) -> Self {
        Self::AckFailure(msg.into())
    }

    /// Create a message source failure error with a message
    pub fn source_failure(msg: impl Into<String>) -> Self {
        Self::SourceFailure(msg.into())
    }

    /// Create a connection error with a message
    pub fn connection_error(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a config error with a message
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StorageFailure(_) | Self::AckFailure(_) | Self::SourceFailure(_)
        )
    }
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestionError>;
