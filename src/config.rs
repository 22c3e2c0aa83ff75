//! Configuration for a cache manager

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::net::Method;

/// Identifies this client to upstream services
pub const USER_AGENT: &str = concat!("apicache/", env!("CARGO_PKG_VERSION"));

/// Settings for a [`CacheManager`](crate::cache::CacheManager)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for cached files of one provider
    pub cache_dir: PathBuf,
    /// Value of the User-Agent header on every request
    pub user_agent: String,
    /// Minimum time between two requests to the same upstream host
    pub min_request_spacing: Duration,
    /// Method used by `CacheManager::request`
    pub method: Method,
    /// Suffixes stripped from logical paths before deriving file names
    pub strip_suffixes: Vec<String>,
}

impl CacheConfig {
    /// Creates a configuration rooted at `cache_dir` with default settings
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            user_agent: USER_AGENT.to_string(),
            min_request_spacing: Duration::from_millis(500),
            method: Method::Post,
            strip_suffixes: vec![".aspx".to_string()],
        }
    }

    /// Returns the XDG-compliant cache directory (`~/.cache/apicache/` on Linux)
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn default_cache_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "apicache")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Configuration for a named provider under the default cache directory
    pub fn for_provider(provider: &str) -> Option<Self> {
        Some(Self::with_dir(Self::default_cache_dir()?.join(provider)))
    }
}
