//! Versioned, checksummed on-disk snapshot of parsed provider results
//!
//! Layout under the provider directory:
//! - `version`: the snapshot format version as a decimal integer
//! - `cache`: a line with the SHA-256 of the payload, then the JSON payload
//!
//! A snapshot is trusted only as a whole: a version mismatch, checksum
//! mismatch or parse failure discards both files and leaves memory empty.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Name of the version marker file
pub const VERSION_FILE: &str = "version";

/// Name of the serialized snapshot file
pub const CACHE_FILE: &str = "cache";

/// A record together with the time it was obtained upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<V> {
    pub value: V,
    pub obtained_at: DateTime<Utc>,
}

impl<V> Stamped<V> {
    pub fn now(value: V) -> Self {
        Self {
            value,
            obtained_at: Utc::now(),
        }
    }

    /// Whether the record is younger than `max_age` at `now`
    fn is_within(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(self.obtained_at) < max_age,
            Err(_) => true,
        }
    }
}

type Entries<S, K, V> = BTreeMap<S, BTreeMap<K, Stamped<V>>>;

#[derive(Serialize)]
struct SnapshotOut<'a, S, K, V> {
    version: u32,
    entries: &'a Entries<S, K, V>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de> + Ord, K: Deserialize<'de> + Ord, V: Deserialize<'de>"))]
struct SnapshotIn<S, K, V> {
    version: u32,
    entries: Entries<S, K, V>,
}

/// What happened when loading a snapshot from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    /// The snapshot was valid; this many records were merged into memory
    Loaded(usize),
    /// No snapshot exists yet
    Empty,
    /// The snapshot was unusable and has been deleted
    Discarded(String),
}

struct SnapshotState<S, K, V> {
    entries: Entries<S, K, V>,
    dirty: bool,
}

/// In-memory index of provider results, keyed by scope then item id,
/// persisted as a whole-file snapshot
///
/// All access goes through one lock; the structure is meant to be shared by
/// reference (or `Arc`) between the threads of one provider.
pub struct PersistedCache<S, K, V> {
    dir: PathBuf,
    version: u32,
    state: Mutex<SnapshotState<S, K, V>>,
}

impl<S, K, V> PersistedCache<S, K, V>
where
    S: Ord + Clone + Serialize + DeserializeOwned,
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Creates an empty cache persisted under `dir` with the expected `version`
    ///
    /// Nothing is read until [`load`](Self::load) is called.
    pub fn open(dir: impl Into<PathBuf>, version: u32) -> Self {
        Self {
            dir: dir.into(),
            version,
            state: Mutex::new(SnapshotState {
                entries: BTreeMap::new(),
                dirty: false,
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn version_path(&self) -> PathBuf {
        self.dir.join(VERSION_FILE)
    }

    fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Loads the on-disk snapshot and merges it into memory
    ///
    /// Never fails: an unusable snapshot is deleted and reported as `Discarded`.
    /// When a record exists both in memory and on disk, the newer one wins.
    pub fn load(&self) -> LoadReport {
        let entries = match self.read_snapshot() {
            Ok(Some(entries)) => entries,
            Ok(None) => return LoadReport::Empty,
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "Discarding persisted snapshot");
                self.discard();
                return LoadReport::Discarded(e.to_string());
            }
        };

        let mut state = self.state.lock();
        let mut count = 0;
        for (scope, records) in entries {
            let scope_map = state.entries.entry(scope).or_default();
            for (key, record) in records {
                count += 1;
                match scope_map.get(&key) {
                    Some(existing) if existing.obtained_at >= record.obtained_at => {}
                    _ => {
                        scope_map.insert(key, record);
                    }
                }
            }
        }

        debug!(dir = ?self.dir, records = count, "Loaded persisted snapshot");
        LoadReport::Loaded(count)
    }

    fn read_snapshot(&self) -> Result<Option<Entries<S, K, V>>, CacheError> {
        let version_text = match fs::read_to_string(self.version_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let version: u32 = version_text
            .trim()
            .parse()
            .map_err(|e| CacheError::Parse(format!("invalid version marker: {}", e)))?;
        if version != self.version {
            return Err(CacheError::Parse(format!(
                "snapshot version {} does not match expected {}",
                version, self.version
            )));
        }

        let contents = fs::read(self.cache_path())?;
        let split = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| CacheError::Parse("missing checksum header".to_string()))?;
        let (header, payload) = (&contents[..split], &contents[split + 1..]);

        if header != sha256_hex(payload).as_bytes() {
            return Err(CacheError::Parse("snapshot checksum mismatch".to_string()));
        }

        let body: SnapshotIn<S, K, V> = serde_json::from_slice(payload)?;
        if body.version != self.version {
            return Err(CacheError::Parse(format!(
                "snapshot body version {} does not match expected {}",
                body.version, self.version
            )));
        }
        Ok(Some(body.entries))
    }

    fn discard(&self) {
        for path in [self.version_path(), self.cache_path()] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?path, error = %e, "Failed to remove snapshot file");
                }
            }
        }
    }

    /// Writes the snapshot if anything changed since the last save or load
    ///
    /// Returns `Ok(false)` when there was nothing to write. On failure the
    /// version marker is removed so the half-written snapshot is never loaded.
    pub fn save(&self) -> Result<bool, CacheError> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(false);
        }

        let payload = serde_json::to_vec(&SnapshotOut {
            version: self.version,
            entries: &state.entries,
        })?;

        if let Err(e) = self.write_files(&payload) {
            if let Err(remove_err) = fs::remove_file(self.version_path()) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    warn!(dir = ?self.dir, error = %remove_err, "Failed to remove version marker");
                }
            }
            return Err(e);
        }

        state.dirty = false;
        debug!(dir = ?self.dir, bytes = payload.len(), "Saved persisted snapshot");
        Ok(true)
    }

    fn write_files(&self, payload: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.dir, &self.version_path(), self.version.to_string().as_bytes())?;

        let mut contents = sha256_hex(payload).into_bytes();
        contents.push(b'\n');
        contents.extend_from_slice(payload);
        write_atomic(&self.dir, &self.cache_path(), &contents)
    }

    /// Returns a record if present and, when `max_age` is given, young enough
    pub fn get(&self, scope: &S, key: &K, max_age: Option<Duration>) -> Option<V> {
        let state = self.state.lock();
        let record = state.entries.get(scope)?.get(key)?;
        match max_age {
            Some(max_age) if !record.is_within(max_age, Utc::now()) => None,
            _ => Some(record.value.clone()),
        }
    }

    /// Stores a record stamped with the current time
    pub fn insert(&self, scope: S, key: K, value: V) {
        self.insert_stamped(scope, key, Stamped::now(value));
    }

    /// Stores a record with an explicit timestamp
    pub fn insert_stamped(&self, scope: S, key: K, record: Stamped<V>) {
        let mut state = self.state.lock();
        state.entries.entry(scope).or_default().insert(key, record);
        state.dirty = true;
    }

    /// Stores several records for one scope under a single lock
    pub fn insert_many<I>(&self, scope: S, records: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let now = Utc::now();
        let mut state = self.state.lock();
        let scope_map = state.entries.entry(scope).or_default();
        let mut inserted = false;
        for (key, value) in records {
            scope_map.insert(
                key,
                Stamped {
                    value,
                    obtained_at: now,
                },
            );
            inserted = true;
        }
        if inserted {
            state.dirty = true;
        }
    }

    /// Total number of records across all scopes
    pub fn len(&self) -> usize {
        self.state.lock().entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Drops every record from memory; the next save writes an empty snapshot
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.dirty = true;
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
