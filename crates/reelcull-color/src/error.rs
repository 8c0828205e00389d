//! Colour subsystem errors.

use reelcull_core::ReelCullError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("invalid LUT: {0}")]
    InvalidLut(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<ColorError> for ReelCullError {
    fn from(err: ColorError) -> Self {
        ReelCullError::TransformResolution(err.to_string())
    }
}
