//! Cache manager tying key derivation, freshness, download and promotion together
//!
//! Provides a `CacheManager` that keeps upstream responses as files on disk,
//! refetches them when a freshness policy says they have expired, and falls
//! back to the previous copy when a refresh fails.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use super::freshness::{self, FreshnessPolicy};
use super::key::{canonicalize, derive_cache_path, Parameters};
use super::outcome::{CacheState, FetchOutcome, Freshness};
use super::validate::Validator;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::net::{DownloadRequest, Downloader, HttpDownloader, Method, RateLimiter};

/// A plain-URL fetch, for providers that choose their own cache file
#[derive(Debug, Clone, Copy)]
pub struct Fetch<'a> {
    pub method: Method,
    pub url: &'a str,
    pub params: &'a Parameters,
}

/// Fully resolved outgoing request
#[derive(Debug)]
struct Target {
    method: Method,
    url: String,
    body: Option<String>,
}

impl Target {
    fn build(method: Method, url: &str, params: &Parameters) -> Self {
        let canonical = canonicalize(params);
        match method {
            Method::Post => Self {
                method,
                url: url.to_string(),
                body: Some(canonical),
            },
            Method::Get if canonical.is_empty() => Self {
                method,
                url: url.to_string(),
                body: None,
            },
            Method::Get => {
                let sep = if url.contains('?') { '&' } else { '?' };
                Self {
                    method,
                    url: format!("{}{}{}", url, sep, canonical),
                    body: None,
                }
            }
        }
    }

    /// Key used to pace requests to the same upstream service
    fn rate_key(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Manages cached upstream responses on disk
///
/// One manager serves one provider: its files live under `cache_dir`, named
/// after the logical resource path with the parameter hash spliced in. A
/// manager is `Send + Sync` and meant to be shared behind an `Arc`.
#[derive(Clone)]
pub struct CacheManager {
    config: CacheConfig,
    base_url: Option<Url>,
    downloader: Arc<dyn Downloader>,
    limiter: Arc<RateLimiter>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a manager that downloads over HTTP
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let downloader = HttpDownloader::new(&config.user_agent)?;
        Ok(Self::with_downloader(config, Arc::new(downloader)))
    }

    /// Creates a manager with a custom downloader
    ///
    /// Useful for testing or when requests go through another transport.
    pub fn with_downloader(config: CacheConfig, downloader: Arc<dyn Downloader>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.min_request_spacing));
        Self {
            config,
            base_url: None,
            downloader,
            limiter,
        }
    }

    /// Sets the service root that logical paths are resolved against
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, CacheError> {
        let url = Url::parse(base_url)
            .map_err(|e| CacheError::InvalidRequest(format!("invalid base URL '{}': {}", base_url, e)))?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Shares a rate limiter with other managers talking to the same upstream
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Returns the cache file for a logical path and parameter set
    ///
    /// Creates the cache directory if it is missing.
    pub fn derive_key(&self, logical_path: &str, params: &Parameters) -> Result<PathBuf, CacheError> {
        derive_cache_path(
            &self.config.cache_dir,
            logical_path,
            params,
            &self.config.strip_suffixes,
        )
    }

    /// Reports the freshness of a cache file without touching the network
    pub fn inspect(&self, path: &Path, policy: &dyn FreshnessPolicy) -> Freshness {
        freshness::inspect(path, policy)
    }

    /// Returns a usable copy of a logical resource, refreshing it if needed
    ///
    /// # Arguments
    /// * `logical_path` - Resource path relative to the base URL (e.g. "/char/CharacterSheet.xml.aspx")
    /// * `params` - Request parameters; sent as the form body (POST) or query (GET)
    /// * `policy` - Decides when the cached file expires
    /// * `validator` - Optional check run on the download before it replaces the cache
    ///
    /// # Behavior
    /// - A fresh cached file is returned without any network call
    /// - Otherwise the request is paced, downloaded to a temp file, validated and promoted
    /// - If the refresh fails, the stale copy is returned with the error attached
    /// - Without a previous copy, the outcome has no path and carries the error
    pub fn request(
        &self,
        logical_path: &str,
        params: &Parameters,
        policy: &dyn FreshnessPolicy,
        validator: Option<&dyn Validator>,
    ) -> FetchOutcome {
        let cache_path = match self.derive_key(logical_path, params) {
            Ok(path) => path,
            Err(e) => return FetchOutcome::unavailable(e),
        };
        let target = self
            .resolve_url(logical_path)
            .map(|url| Target::build(self.config.method, url.as_str(), params));

        self.cache_internal(target, &cache_path, policy, validator)
    }

    /// Caches a plain URL into a caller-chosen file
    ///
    /// Same refresh and fallback rules as [`request`](Self::request).
    pub fn cache_file(
        &self,
        fetch: Fetch<'_>,
        cache_path: &Path,
        policy: &dyn FreshnessPolicy,
        validator: Option<&dyn Validator>,
    ) -> FetchOutcome {
        let target = Target::build(fetch.method, fetch.url, fetch.params);
        self.cache_internal(Ok(target), cache_path, policy, validator)
    }

    fn resolve_url(&self, logical_path: &str) -> Result<Url, CacheError> {
        let base = self.base_url.as_ref().ok_or_else(|| {
            CacheError::InvalidRequest("no base URL configured for this cache".to_string())
        })?;
        base.join(logical_path).map_err(|e| {
            CacheError::InvalidRequest(format!("cannot resolve '{}': {}", logical_path, e))
        })
    }

    fn cache_internal(
        &self,
        target: Result<Target, CacheError>,
        cache_path: &Path,
        policy: &dyn FreshnessPolicy,
        validator: Option<&dyn Validator>,
    ) -> FetchOutcome {
        let current = freshness::inspect(cache_path, policy);
        if current.state == CacheState::Fresh {
            debug!(path = ?cache_path, expires_at = ?current.expires_at, "Cache hit");
            return FetchOutcome::hit(cache_path.to_path_buf(), current.expires_at);
        }

        match target.and_then(|t| self.refresh(&t, cache_path, validator)) {
            Ok(()) => {
                let promoted = freshness::inspect(cache_path, policy);
                debug!(path = ?cache_path, expires_at = ?promoted.expires_at, "Promoted download");
                FetchOutcome {
                    path: Some(cache_path.to_path_buf()),
                    updated: true,
                    state: CacheState::Fresh,
                    expires_at: promoted.expires_at,
                    error: promoted.error,
                }
            }
            Err(err) => self.fall_back(cache_path, policy, current.state, err),
        }
    }

    /// Downloads, validates and promotes; the cache file is only replaced on success
    fn refresh(
        &self,
        target: &Target,
        cache_path: &Path,
        validator: Option<&dyn Validator>,
    ) -> Result<(), CacheError> {
        let temp_dir = cache_path
            .parent()
            .ok_or_else(|| CacheError::InvalidRequest(format!("{} has no parent", cache_path.display())))?;
        fs::create_dir_all(temp_dir)?;

        self.limiter.acquire(&target.rate_key());

        let request = DownloadRequest {
            method: target.method,
            url: &target.url,
            body: target.body.as_deref(),
        };
        let temp = self.downloader.download(&request, temp_dir)?;

        if let Some(validator) = validator {
            validator.validate(temp.path())?;
        }

        // Rename over the old file; readers see either the old or the new bytes
        temp.persist(cache_path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn fall_back(
        &self,
        cache_path: &Path,
        policy: &dyn FreshnessPolicy,
        previous: CacheState,
        err: CacheError,
    ) -> FetchOutcome {
        if previous == CacheState::Missing {
            warn!(path = ?cache_path, error = %err, "Fetch failed with nothing cached");
            return FetchOutcome::unavailable(err);
        }

        let existing = freshness::inspect(cache_path, policy);
        if existing.state == CacheState::Missing {
            warn!(path = ?cache_path, error = %err, "Fetch failed and cached copy vanished");
            return FetchOutcome::unavailable(err);
        }

        warn!(path = ?cache_path, error = %err, "Refresh failed, using stale copy");
        FetchOutcome {
            path: Some(cache_path.to_path_buf()),
            updated: false,
            state: existing.state,
            expires_at: existing.expires_at,
            error: Some(err),
        }
    }
}
