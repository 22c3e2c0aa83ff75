//! Local disk cache for responses from rate-limited HTTP data sources
//!
//! Callers ask a [`CacheManager`](cache::CacheManager) for a resource by
//! logical path and parameters; the manager reuses a fresh local copy,
//! or refetches, validates and atomically replaces it, falling back to the
//! stale copy when the upstream misbehaves.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod snapshot;

pub use cache::{CacheManager, CacheState, FetchOutcome, Parameters};
pub use config::CacheConfig;
pub use error::{CacheError, ValidationError};
