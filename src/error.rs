//! Error types for the soundfield crate.

use thiserror::Error;

/// Result type for soundfield operations.
pub type Result<T> = std::result::Result<T, SoundfieldError>;

/// Errors that can occur while building or driving an acoustic domain.
#[derive(Error, Debug)]
pub enum SoundfieldError {
    /// No usable compute backend was found on this machine.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A backend operation (pipeline creation, dispatch) failed.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// A host/device transfer failed.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// The requested domain configuration cannot be simulated.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
