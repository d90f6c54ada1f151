//! Error types shared across the crate.

/// Result type for PiP and control operations
pub type Result<T> = std::result::Result<T, PipError>;

/// Failures raised by a host platform capability (DOM, media, PiP surfaces)
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Capability not supported: {0}")]
    Unsupported(String),

    #[error("Permission denied: {0}")]
    Denied(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Node is not attached to a document")]
    NotAttached,

    #[error("Platform operation failed: {0}")]
    Failed(String),
}

/// Error types for PiP session and command handling
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipError {
    #[error("No video found")]
    NoVideo,

    #[error("Invalid video target: {0}")]
    InvalidTarget(usize),

    #[error("PiP is disabled on {0}")]
    Blocked(String),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}
