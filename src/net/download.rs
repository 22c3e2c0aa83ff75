//! Downloads a single HTTP response into a private temporary file
//!
//! Downloads never touch the cache location directly: the orchestrator
//! promotes the temp file only after validation succeeds.

use std::fmt;
use std::path::Path;

use reqwest::blocking::Client;
use reqwest::header::{CONNECTION, CONTENT_TYPE};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::CacheError;

/// Content type used for POST bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP method used for a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One outgoing request
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    /// Canonical form-encoded body, POST only
    pub body: Option<&'a str>,
}

/// Performs a network fetch into a temp file
pub trait Downloader: Send + Sync {
    /// Streams the response body into a new temp file created in `temp_dir`
    ///
    /// The temp file is deleted when the returned handle is dropped, so a
    /// failed or abandoned download never leaves anything behind.
    fn download(
        &self,
        request: &DownloadRequest<'_>,
        temp_dir: &Path,
    ) -> Result<NamedTempFile, CacheError>;
}

/// Blocking HTTP downloader
///
/// Every request carries a fixed User-Agent and `Connection: close`; the
/// connection pool keeps no idle connections.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// Creates a downloader identifying itself as `user_agent`
    pub fn new(user_agent: &str) -> Result<Self, CacheError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { client })
    }

    /// Creates a downloader with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Downloader for HttpDownloader {
    fn download(
        &self,
        request: &DownloadRequest<'_>,
        temp_dir: &Path,
    ) -> Result<NamedTempFile, CacheError> {
        let builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self
                .client
                .post(request.url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(request.body.unwrap_or_default().to_string()),
        };

        let mut response = builder
            .header(CONNECTION, "close")
            .send()?
            .error_for_status()?;

        // Dropping the temp file on any error below removes the partial download
        let mut temp = NamedTempFile::new_in(temp_dir)?;
        let written = response.copy_to(temp.as_file_mut())?;
        temp.as_file().sync_all()?;

        debug!(
            method = %request.method,
            url = request.url,
            bytes = written,
            temp = ?temp.path(),
            "Downloaded response"
        );
        Ok(temp)
    }
}
