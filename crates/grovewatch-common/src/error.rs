//! Error types for Grovewatch.

use thiserror::Error;

use crate::version::ProtocolVersion;

/// Top-level error type for Grovewatch operations.
#[derive(Debug, Error)]
pub enum GrovewatchError {
    /// Configuration could not be used
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Replication protocol mismatch
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this build speaks
        expected: ProtocolVersion,
        /// Version found in the frame
        actual: ProtocolVersion,
    },
}

/// Result type alias for Grovewatch operations.
pub type GrovewatchResult<T> = Result<T, GrovewatchError>;
