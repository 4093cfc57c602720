//! Error types for the comparison pipeline

use thiserror::Error;

/// Result type alias for critic operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering, storing or comparing pages
#[derive(Error, Debug)]
pub enum Error {
    /// The page itself (not a sub-resource) could not be loaded
    #[error("Page could not be loaded: {0}")]
    PageUnreachable(String),

    /// A surface could not be exported to its storable encoding
    #[error("Failed to encode surface: {0}")]
    Encode(String),

    /// A stored surface could not be read back
    #[error("Failed to decode surface: {0}")]
    Decode(String),

    /// Surface dimensions and pixel buffer do not agree
    #[error("Invalid surface: {0}")]
    InvalidSurface(String),

    /// Two surfaces were expected to share dimensions
    #[error("Size mismatch: {actual_width}x{actual_height} vs {expected_width}x{expected_height}")]
    DimensionMismatch {
        actual_width: u32,
        actual_height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// Reference store failure
    #[error("Reference store error: {0}")]
    Store(String),

    /// Failed to render content
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

#[cfg(feature = "html")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}
