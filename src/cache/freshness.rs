//! Freshness policies deciding when a cached file expires

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::outcome::{CacheState, Freshness};
use crate::error::CacheError;

/// Answers "when does this cached file expire?"
pub trait FreshnessPolicy: Send + Sync {
    /// Computes the expiry of an existing cache file
    fn expires_at(&self, path: &Path) -> Result<DateTime<Utc>, CacheError>;
}

/// Expires a fixed duration after the file was last written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTtl {
    ttl: Duration,
}

impl FixedTtl {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours.saturating_mul(3600)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl FreshnessPolicy for FixedTtl {
    fn expires_at(&self, path: &Path) -> Result<DateTime<Utc>, CacheError> {
        let modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();
        Ok(chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| modified.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

type ExpiryExtractor = dyn Fn(&[u8]) -> Result<DateTime<Utc>, CacheError> + Send + Sync;

/// Reads the expiry out of the cached payload itself
pub struct EmbeddedExpiry {
    extract: Box<ExpiryExtractor>,
}

impl EmbeddedExpiry {
    /// Uses `extract` to pull the expiry from the file's bytes
    pub fn new<F>(extract: F) -> Self
    where
        F: Fn(&[u8]) -> Result<DateTime<Utc>, CacheError> + Send + Sync + 'static,
    {
        Self {
            extract: Box::new(extract),
        }
    }

    /// Reads the text of the first `<name>...</name>` element as a UTC timestamp
    pub fn element(name: &str) -> Self {
        let open = format!("<{}>", name);
        let close = format!("</{}>", name);
        Self::new(move |bytes| {
            let text = String::from_utf8_lossy(bytes);
            let value = element_text(&text, &open, &close).ok_or_else(|| {
                CacheError::Parse(format!("no {} element in cached payload", open))
            })?;
            parse_timestamp(value)
        })
    }
}

impl std::fmt::Debug for EmbeddedExpiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedExpiry").finish_non_exhaustive()
    }
}

impl FreshnessPolicy for EmbeddedExpiry {
    fn expires_at(&self, path: &Path) -> Result<DateTime<Utc>, CacheError> {
        let bytes = fs::read(path)?;
        (self.extract)(&bytes)
    }
}

fn element_text<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let len = text[start..].find(close)?;
    Some(text[start..start + len].trim())
}

/// Parses `YYYY-MM-DD HH:MM:SS` (taken as UTC) or an RFC 3339 timestamp
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CacheError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::Parse(format!("invalid timestamp '{}': {}", value, e)))
}

/// Inspects a cache file against a policy
///
/// Never fails: a file that does not exist, cannot be read, or whose expiry
/// cannot be computed is reported as `Missing`, with the reason attached.
pub fn inspect(path: &Path, policy: &dyn FreshnessPolicy) -> Freshness {
    inspect_at(path, policy, Utc::now())
}

pub(crate) fn inspect_at(path: &Path, policy: &dyn FreshnessPolicy, now: DateTime<Utc>) -> Freshness {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Freshness::missing(Some(CacheError::InvalidRequest(format!(
                "{} is not a file",
                path.display()
            ))))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Freshness::missing(None),
        Err(e) => return Freshness::missing(Some(e.into())),
    }

    match policy.expires_at(path) {
        Ok(expires_at) => Freshness {
            state: if now < expires_at {
                CacheState::Fresh
            } else {
                CacheState::Stale
            },
            expires_at: Some(expires_at),
            error: None,
        },
        Err(e) => Freshness::missing(Some(e)),
    }
}
