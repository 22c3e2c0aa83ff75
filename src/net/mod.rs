//! Network side of the cache: downloads and request pacing

mod download;
mod rate_limit;

pub use download::{DownloadRequest, Downloader, HttpDownloader, Method, FORM_CONTENT_TYPE};
pub use rate_limit::RateLimiter;
