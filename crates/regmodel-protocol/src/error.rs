//! Error types for frame decoding

use thiserror::Error;

/// Errors that can occur while decoding a protocol frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Fewer bytes than one full frame were available
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}
