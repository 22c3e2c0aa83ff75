//! Secondary cache for providers that keep a long-lived in-memory index
//!
//! Parsed results are held in memory keyed by scope and item id, and saved
//! as a single versioned snapshot. Bulk payloads feeding that index are
//! parsed with bounded error tolerance.

pub mod ingest;
mod store;

pub use ingest::{open_text, parse_records, IngestOptions, DEFAULT_MAX_MALFORMED};
pub use store::{LoadReport, PersistedCache, Stamped, CACHE_FILE, VERSION_FILE};
