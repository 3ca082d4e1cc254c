//! Error types for Granary

use thiserror::Error;

/// Result type alias for Granary operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for granule ingest
///
/// Every failure the orchestration layer can observe is a member of this
/// taxonomy. Transport-level errors are translated into `RemoteResource`
/// or `ConnectionTimeout` at the protocol adapter boundary so callers
/// never see raw client errors.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported checksum type: {0}")]
    UnsupportedChecksumType(String),

    #[error("Invalid checksum for {key} in {bucket} bucket: expected {expected}, got {actual}")]
    InvalidChecksum {
        bucket: String,
        key: String,
        expected: String,
        actual: String,
    },

    #[error("{key} already exists in {bucket} bucket")]
    DuplicateFile { bucket: String, key: String },

    #[error("Download lock remained in place after multiple tries: {resource}")]
    ResourcesLocked { resource: String },

    #[error("Remote resource error: {0}")]
    RemoteResource(String),

    #[error("Connection timed out: {0}")]
    ConnectionTimeout(String),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Could not determine granule id of {name} using {regex}")]
    GranuleIdExtraction { name: String, regex: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl IngestError {
    /// Configuration error with a formatted message
    pub fn configuration(msg: impl Into<String>) -> Self {
        IngestError::Configuration(msg.into())
    }

    /// Storage error with a formatted message
    pub fn storage(msg: impl Into<String>) -> Self {
        IngestError::Storage(msg.into())
    }
}
