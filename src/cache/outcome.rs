//! Result types describing the state of a cached file

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::CacheError;

/// Freshness of a cached file relative to its computed expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// The file exists and has not expired
    Fresh,
    /// The file exists but its expiry has passed
    Stale,
    /// The file does not exist or could not be inspected
    Missing,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Fresh => "fresh",
            CacheState::Stale => "stale",
            CacheState::Missing => "missing",
        }
    }
}

/// Result of inspecting a cache file against a freshness policy
#[derive(Debug)]
pub struct Freshness {
    pub state: CacheState,
    /// Computed expiry; `None` when the file is missing or unreadable
    pub expires_at: Option<DateTime<Utc>>,
    /// Why inspection fell back to `Missing`, if it did
    pub error: Option<CacheError>,
}

impl Freshness {
    pub(crate) fn missing(error: Option<CacheError>) -> Self {
        Self {
            state: CacheState::Missing,
            expires_at: None,
            error,
        }
    }
}

/// Returned to the caller for every cache request
///
/// When `path` is set it always points at a previously accepted cache file,
/// never at a partial download.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Usable cache file, if there is one
    pub path: Option<PathBuf>,
    /// Whether this call downloaded and promoted a new copy
    pub updated: bool,
    pub state: CacheState,
    pub expires_at: Option<DateTime<Utc>>,
    /// Why a download did not happen or did not succeed
    pub error: Option<CacheError>,
}

impl FetchOutcome {
    /// Outcome for a file that was already fresh
    pub(crate) fn hit(path: PathBuf, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            path: Some(path),
            updated: false,
            state: CacheState::Fresh,
            expires_at,
            error: None,
        }
    }

    /// Outcome when nothing usable is available
    pub(crate) fn unavailable(error: CacheError) -> Self {
        Self {
            path: None,
            updated: false,
            state: CacheState::Missing,
            expires_at: None,
            error: Some(error),
        }
    }

    /// Returns the usable file path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the caller can read a cached file from this outcome
    pub fn is_usable(&self) -> bool {
        self.path.is_some()
    }

    /// Converts into the usable path, or the error when there is none
    pub fn into_result(self) -> Result<PathBuf, CacheError> {
        match (self.path, self.error) {
            (Some(path), _) => Ok(path),
            (None, Some(err)) => Err(err),
            (None, None) => Err(CacheError::InvalidRequest(
                "no cached file available".to_string(),
            )),
        }
    }
}
