use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::domain::SequenceMetadata;
use crate::error::RefProtError;

pub const CACHE_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);
pub const SEARCH_KEY_PREFIX: &str = "search_";
pub const CACHE_FILE_NAME: &str = "query_cache.json";
pub const PROJECT_CACHE_DIR: &str = ".kira-refprot";

pub fn cache_key(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn search_cache_key(query: &str) -> String {
    cache_key(&format!("{SEARCH_KEY_PREFIX}{query}"))
}

/// Seconds since the Unix epoch, with sub-second precision.
pub fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: f64,
    pub result: Value,
}

impl CacheEntry {
    pub fn new(result: Value) -> Self {
        Self {
            timestamp: unix_now(),
            result,
        }
    }

    pub fn is_fresh_at(&self, now: f64, expiry: Duration) -> bool {
        now - self.timestamp < expiry.as_secs_f64()
    }
}

pub trait CacheStore {
    /// Returns the stored value unless it is missing or expired.
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: &str, value: Value) -> Result<(), RefProtError>;
}

impl<T: CacheStore + ?Sized> CacheStore for &T {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Value) -> Result<(), RefProtError> {
        (**self).put(key, value)
    }
}

/// Single JSON object on disk, reloaded on every operation. Concurrent
/// writers are last-write-wins.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: Utf8PathBuf,
    expiry: Duration,
}

impl JsonFileCache {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            expiry: CACHE_EXPIRY,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn in_dir(dir: &Utf8Path) -> Self {
        Self::new(dir.join(CACHE_FILE_NAME))
    }

    pub fn project() -> Result<Self, RefProtError> {
        let cwd = std::env::current_dir().map_err(|err| RefProtError::Filesystem(err.to_string()))?;
        let dir = Utf8PathBuf::from_path_buf(cwd.join(PROJECT_CACHE_DIR))
            .map_err(|_| RefProtError::Filesystem("invalid project path".to_string()))?;
        Ok(Self::in_dir(&dir))
    }

    pub fn global() -> Result<Self, RefProtError> {
        let dir = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-refprot"))
                    .ok()
            })
            .ok_or_else(|| {
                RefProtError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self::in_dir(&dir))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    // Entries are kept as raw values so a rewrite preserves shapes this
    // version does not understand.
    fn load(&self) -> Result<BTreeMap<String, Value>, RefProtError> {
        if !self.path.as_std_path().exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| RefProtError::Cache(format!("read {}: {err}", self.path)))?;
        serde_json::from_str(&content)
            .map_err(|err| RefProtError::Cache(format!("parse {}: {err}", self.path)))
    }

    fn save(&self, entries: &BTreeMap<String, Value>) -> Result<(), RefProtError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RefProtError::Cache(format!("create {parent}: {err}")))?;
        let content = serde_json::to_vec_pretty(entries)
            .map_err(|err| RefProtError::Cache(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("query-cache")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| RefProtError::Cache(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| RefProtError::Cache(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| RefProtError::Cache(err.to_string()))?;
        Ok(())
    }
}

impl CacheStore for JsonFileCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable query cache");
                return None;
            }
        };
        let raw = entries.remove(key)?;
        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(key, error = %err, "skipping undecodable cache entry");
                return None;
            }
        };
        if !entry.is_fresh_at(unix_now(), self.expiry) {
            debug!(key, "cache entry expired");
            return None;
        }
        Some(entry.result)
    }

    fn put(&self, key: &str, value: Value) -> Result<(), RefProtError> {
        let mut entries = self.load().unwrap_or_else(|err| {
            warn!(error = %err, "starting a fresh query cache");
            BTreeMap::new()
        });
        let entry = serde_json::to_value(CacheEntry::new(value))
            .map_err(|err| RefProtError::Cache(err.to_string()))?;
        entries.insert(key.to_string(), entry);
        self.save(&entries)
    }
}

/// In-process store with the same expiry semantics as the file cache.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    expiry: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expiry: CACHE_EXPIRY,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entry(&self, key: &str, entry: CacheEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), entry);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh_at(unix_now(), self.expiry))
            .map(|entry| entry.result.clone())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), RefProtError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RefProtError::Cache("memory cache poisoned".to_string()))?;
        entries.insert(key.to_string(), CacheEntry::new(value));
        Ok(())
    }
}

/// A finished retrieval as stored under a search key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRetrieval {
    pub accession: String,
    pub fasta: String,
    #[serde(default)]
    pub metadata: SequenceMetadata,
}

// Older cache files hold `[accession, fasta, metadata]` arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum CachedPayload {
    Record(CachedRetrieval),
    Triple(String, String, SequenceMetadata),
}

impl CachedRetrieval {
    pub fn from_value(value: Value) -> Option<Self> {
        match serde_json::from_value(value).ok()? {
            CachedPayload::Record(record) => Some(record),
            CachedPayload::Triple(accession, fasta, metadata) => Some(Self {
                accession,
                fasta,
                metadata,
            }),
        }
    }

    pub fn to_value(&self) -> Result<Value, RefProtError> {
        serde_json::to_value(self).map_err(|err| RefProtError::Cache(err.to_string()))
    }
}
