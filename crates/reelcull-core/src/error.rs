//! Error types for ReelCull.

use thiserror::Error;

/// Main error type for ReelCull operations.
///
/// Every variant is recoverable: playback degrades to a poster frame,
/// grading degrades to passthrough, cancelled work is dropped silently,
/// and failed store writes stay staged until they succeed.
#[derive(Error, Debug)]
pub enum ReelCullError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Transform resolution error: {0}")]
    TransformResolution(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Persistence write error: {0}")]
    PersistenceWrite(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReelCullError {
    /// True for failures that end work silently instead of reporting a
    /// problem. Cancellations must never reach the user.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Result type alias for ReelCull operations.
pub type Result<T> = std::result::Result<T, ReelCullError>;
