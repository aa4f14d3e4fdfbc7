//! Error types for pfi-ingest
//!
//! One taxonomy covers the whole run: media and recognition failures from the
//! pipeline, and HTTP/network failures from the profile parse client.

use thiserror::Error;

/// Import pipeline and sync error type
#[derive(Debug, Error)]
pub enum ImportError {
    /// Video cannot be sampled (unreadable, zero duration, shorter than one interval)
    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    /// Every frame extraction attempt failed
    #[error("No frames could be extracted from the video")]
    NoFramesExtracted,

    /// Run started with no input images
    #[error("No input images")]
    NoImages,

    /// Bitmap could not be read or decoded
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Recognizer rejected an image (absorbed per image by the pipeline)
    #[error("Text recognition failed: {0}")]
    RecognitionFailed(String),

    /// Parse endpoint rejected the device token twice
    #[error("Unauthorized")]
    Unauthorized,

    /// Non-retryable (or retry-exhausted 429) HTTP status
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// Parse endpoint returned a 5xx response
    #[error("Server error: {0}")]
    ServerError(String),

    /// 2xx response whose body did not decode
    #[error("Failed to decode response: {cause}")]
    DecodingError { cause: String, raw_body: String },

    /// Timeout, connection loss, no connectivity
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Caller cancelled the run or request
    #[error("Cancelled")]
    Cancelled,

    /// Request payload rejected before any network I/O
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration resolution or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// pfi-common error
    #[error("Common error: {0}")]
    Common(#[from] pfi_common::Error),
}

impl ImportError {
    /// Failure classes the parse client retries with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            ImportError::NetworkError(_) | ImportError::ServerError(_) => true,
            ImportError::HttpError(status) => *status == 429,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImportError::Cancelled)
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::NetworkError(err.to_string())
    }
}

/// Result type for the import pipeline and sync client
pub type ImportResult<T> = Result<T, ImportError>;
