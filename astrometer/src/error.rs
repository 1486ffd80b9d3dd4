use thiserror::Error;

/// Errors produced by the annotation engine.
///
/// Geometry edge cases (out-of-bounds drags, invalid radii, non-converging
/// centroid searches) never show up here: they are clamped or defaulted where
/// they occur. Only configuration and resource loading problems are reported.
#[derive(Error, Debug)]
pub enum AstrometerError {
    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame image could not be fetched or decoded.
    #[error("failed to load frame {frame}: {reason}")]
    LoadFailure {
        /// Index of the frame in the sequence.
        frame: usize,
        /// Human readable cause, shown in the loading indicator.
        reason: String,
    },

    /// Raw pixel data does not match the declared dimensions.
    #[error("pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        actual: usize,
    },

    /// Configuration JSON could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Image decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AstrometerError {
    /// Build a load failure for the given frame index.
    pub fn load_failure(frame: usize, reason: impl Into<String>) -> Self {
        AstrometerError::LoadFailure {
            frame,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AstrometerError>;
