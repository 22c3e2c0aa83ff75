//! Request parameters, their canonical encoding, and cache path derivation
//!
//! The canonical string is both the form-encoded POST body and the input to the
//! parameter hash that ends up in the cache file name, so two parameter sets
//! with the same pairs always land on the same file no matter how they were built.

use std::fs;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tracing::debug;
use url::form_urlencoded;

use crate::error::CacheError;

/// A set of request parameters
///
/// Pairs are kept as a multiset: the same name may appear more than once
/// (e.g. repeated `typeid=` entries in a batch query). Insertion order is
/// irrelevant to [`canonicalize`] and [`parameter_hash`].
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    /// Creates an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any existing pairs with that name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.pairs.retain(|(k, _)| *k != name);
        self.pairs.push((name, value.into()));
        self
    }

    /// Adds a pair without touching existing pairs of the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    /// Returns the first value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Iterates over pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the pairs sorted by name, then by value
    fn sorted(&self) -> Vec<&(String, String)> {
        let mut sorted: Vec<_> = self.pairs.iter().collect();
        sorted.sort();
        sorted
    }
}

impl PartialEq for Parameters {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for Parameters {}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Encodes parameters as a sorted, form-encoded `key=value&...` string
///
/// Pairs are ordered by name then value (byte order), each side is
/// `application/x-www-form-urlencoded` escaped. An empty set yields `""`.
pub fn canonicalize(params: &Parameters) -> String {
    params
        .sorted()
        .into_iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Returns the 32-character lowercase hex digest of the canonical encoding
pub fn parameter_hash(params: &Parameters) -> String {
    let digest = Md5::digest(canonicalize(params).as_bytes());
    hex::encode(digest)
}

/// Maps a logical resource path and its parameters to a file under `root`
///
/// `/char/CharacterSheet.xml.aspx` with suffix `.aspx` becomes
/// `root/char.CharacterSheet.<hash>.xml`. The parent directory is created if
/// it does not exist yet.
pub fn derive_cache_path(
    root: &Path,
    logical_path: &str,
    params: &Parameters,
    strip_suffixes: &[String],
) -> Result<PathBuf, CacheError> {
    let mut name = logical_path.trim_start_matches(['/', '\\']);
    for suffix in strip_suffixes {
        if let Some(stripped) = name.strip_suffix(suffix.as_str()) {
            name = stripped;
            break;
        }
    }

    let name = name.replace(['/', '\\'], ".");
    if name.trim_matches('.').is_empty() {
        return Err(CacheError::InvalidRequest(format!(
            "logical path '{}' has no file name",
            logical_path
        )));
    }

    let hash = parameter_hash(params);
    let file_name = match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.{}{}", &name[..idx], hash, &name[idx..]),
        _ => format!("{}.{}", name, hash),
    };

    let path = root.join(file_name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    debug!(logical_path, path = ?path, "Derived cache path");
    Ok(path)
}
