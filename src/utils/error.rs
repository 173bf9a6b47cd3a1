//! Error types for the image pipeline

use thiserror::Error;

/// Main error type for operations that can fail outside the dispatcher
///
/// Load failures inside the dispatcher never surface here; they resolve to
/// fallback buffers. This covers construction and configuration only.
#[derive(Debug, Error)]
pub enum ScoutError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
    /// Worker runtime could not be started
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Network-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// URL failed to parse
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Only http and https are fetched
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// Request exceeded the configured fetch timeout
    #[error("request timed out")]
    Timeout,
    /// Non-success HTTP status
    #[error("http status {0}")]
    Status(u16),
    /// Response was not an image
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),
    /// Connection, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Decoding and resizing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Bytes could not be parsed as an image
    #[error("malformed image: {0}")]
    Malformed(String),
    /// Allocation of the pixel buffer was refused
    #[error("memory exhausted: {0}")]
    MemoryExhausted(String),
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(limit) => Self::MemoryExhausted(limit.to_string()),
            other => Self::Malformed(other.to_string()),
        }
    }
}

impl From<jpeg_decoder::Error> for DecodeError {
    fn from(err: jpeg_decoder::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Failure of one fetch+decode unit of work
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl LoadError {
    /// True when the failure should resolve to the out-of-memory fallback
    pub fn is_memory_exhausted(&self) -> bool {
        matches!(self, Self::Decode(DecodeError::MemoryExhausted(_)))
    }
}

/// Convenience Result type for crate operations
pub type Result<T> = std::result::Result<T, ScoutError>;
