//! # Error Types
//!
//! Custom error types for the cell logger using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a synchronous query against the radio, position or
/// resource capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The capability could not be reached at all
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The capability answered but the call failed
    #[error("capability call {call} failed: {reason}")]
    CallFailed { call: &'static str, reason: String },
}

/// Main error type for the cell logger
#[derive(Debug, Error)]
pub enum LoggerError {
    /// A capability query failed; the snapshot built from it is invalid
    #[error("transient read error: {0}")]
    TransientRead(#[from] CapabilityError),

    /// Configuration parse or validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized for persisting
    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// A required option is absent and has no documented default
    #[error("Configuration option missing: {0}")]
    ConfigurationMissing(String),

    /// Writing a log file failed; the buffered records are retained
    #[error("failed to write log file {}: {source}", path.display())]
    FlushWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The collector speaks a protocol version we do not support
    #[error("server API version {} does not match supported version {local}", server.as_deref().unwrap_or("<unknown>"))]
    UploadVersionMismatch { server: Option<String>, local: String },

    /// Network failure while uploading; the batch was aborted
    #[error("upload aborted after {uploaded}/{attempted} files: {message}")]
    UploadTransport {
        message: String,
        uploaded: usize,
        attempted: usize,
    },

    /// Filesystem failure while uploading; the batch was aborted
    #[error("upload aborted after {uploaded}/{attempted} files, {}: {source}", path.display())]
    UploadIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        uploaded: usize,
        attempted: usize,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the cell logger
pub type Result<T> = std::result::Result<T, LoggerError>;
