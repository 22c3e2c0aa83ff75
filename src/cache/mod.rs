//! Cache module for storing upstream responses on disk
//!
//! This module provides a cache manager that keeps each response as a file
//! named after its logical path and parameter hash. Freshness is decided by a
//! pluggable policy; refreshes are downloaded to a temp file, validated, and
//! renamed into place. When a refresh fails, the previous file is returned
//! with the error attached, allowing callers to keep working on stale data.

mod freshness;
mod key;
mod manager;
mod outcome;
mod validate;

pub use freshness::{inspect, parse_timestamp, EmbeddedExpiry, FixedTtl, FreshnessPolicy};
pub use key::{canonicalize, derive_cache_path, parameter_hash, Parameters};
pub use manager::{CacheManager, Fetch};
pub use outcome::{CacheState, FetchOutcome, Freshness};
pub use validate::{NonEmpty, Validator};
