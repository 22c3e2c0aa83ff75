//! Error types shared across the cache, network and snapshot layers

use std::fmt;

use thiserror::Error;

/// Rejection raised by a validation hook after inspecting a downloaded file
///
/// Upstream services often answer with a well-formed body that carries an
/// error code and message instead of data; hooks report that here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Upstream error code, if the payload carried one
    pub code: Option<i64>,
    /// Human-readable reason for the rejection
    pub message: String,
}

impl ValidationError {
    /// Creates a rejection without an upstream error code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a rejection carrying an upstream error code
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "({}) {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors that can occur while fetching, validating or persisting cached data
#[derive(Debug, Error)]
pub enum CacheError {
    /// Connection failure, timeout, non-success status or truncated body
    #[error("Network request failed: {0}")]
    Network(String),

    /// The validation hook rejected the downloaded content
    #[error("Downloaded content rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Cached content or snapshot could not be parsed
    #[error("Failed to parse cached content: {0}")]
    Parse(String),

    /// Bulk ingestion gave up after too many bad records
    #[error("Failed to parse records: {count} malformed (last: {last})")]
    MalformedRecords {
        /// Number of malformed records seen before aborting
        count: usize,
        /// Description of the last failure
        last: String,
    },

    /// Filesystem failure reading or writing cache or temp files
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself could not be turned into a URL or cache path
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification of a [`CacheError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Validation,
    Parse,
    CacheIo,
    InvalidRequest,
}

impl CacheError {
    /// Returns the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Network(_) => ErrorKind::Network,
            CacheError::Validation(_) => ErrorKind::Validation,
            CacheError::Parse(_) | CacheError::MalformedRecords { .. } => ErrorKind::Parse,
            CacheError::Io(_) => ErrorKind::CacheIo,
            CacheError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Parse(err.to_string())
    }
}
