//! Error type for HAL capability operations.

use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Pin, channel or device index is out of the backend's configured range.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// Hardware/simulation communication error.
    #[error("communication error: {0}")]
    CommunicationError(String),

    /// Conversion or transfer did not complete within its fixed budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Backend initialization failed.
    #[error("initialization failed: {0}")]
    InitFailed(String),
}
