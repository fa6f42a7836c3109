//! Per-visitor completion cache and section preferences.
//!
//! Entries never expire. Every mutation writes the full set through to the
//! backing store before returning.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

pub const VOTED_RESOURCES_KEY: &str = "voted-resources";
pub const COMPLETED_VERIFICATIONS_KEY: &str = "completed-verifications";
pub const SECTION_MINIMIZED_KEY: &str = "verification-section-minimized";
pub const SECTION_IGNORED_KEY: &str = "verification-section-ignored";
pub const VISITOR_COUNT_KEY: &str = "visitor-count";

/// Durable string key/value storage, one namespace per client.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Key/value storage in a single JSON object file.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store, starting empty if the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = ?path, error = %e, "Discarding unreadable local storage");
                HashMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to read local storage");
                HashMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// In-memory storage; lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    voted_resources: BTreeSet<String>,
    completed_verifications: BTreeSet<String>,
}

/// Which items this visitor already voted on or verified, plus section flags.
pub struct CompletionCache {
    store: Arc<dyn KeyValueStore>,
    state: RwLock<CacheState>,
}

impl CompletionCache {
    /// Load both sets from the store.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let cache = Self {
            store,
            state: RwLock::new(CacheState::default()),
        };
        cache.merge_from_store();
        cache
    }

    /// Union whatever is stored into the in-memory sets.
    pub fn merge_from_store(&self) {
        let voted = read_set(self.store.as_ref(), VOTED_RESOURCES_KEY);
        let completed = read_set(self.store.as_ref(), COMPLETED_VERIFICATIONS_KEY);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.voted_resources.extend(voted);
        state.completed_verifications.extend(completed);
    }

    pub fn mark_voted(&self, resource_id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.voted_resources.insert(resource_id.to_string()) {
            write_set(self.store.as_ref(), VOTED_RESOURCES_KEY, &state.voted_resources);
        }
    }

    pub fn has_voted(&self, resource_id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.voted_resources.contains(resource_id)
    }

    pub fn mark_completed(&self, item_id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.completed_verifications.insert(item_id.to_string()) {
            write_set(
                self.store.as_ref(),
                COMPLETED_VERIFICATIONS_KEY,
                &state.completed_verifications,
            );
        }
    }

    pub fn has_completed(&self, item_id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.completed_verifications.contains(item_id)
    }

    pub fn is_minimized(&self) -> bool {
        self.flag(SECTION_MINIMIZED_KEY)
    }

    /// Flip the minimized flag and return the new value.
    pub fn toggle_minimized(&self) -> bool {
        let minimized = !self.is_minimized();
        self.set_flag(SECTION_MINIMIZED_KEY, minimized);
        minimized
    }

    pub fn is_ignored(&self) -> bool {
        self.flag(SECTION_IGNORED_KEY)
    }

    pub fn ignore(&self) {
        self.set_flag(SECTION_IGNORED_KEY, true);
    }

    /// Show the section again: clears both ignored and minimized.
    pub fn show(&self) {
        for key in [SECTION_IGNORED_KEY, SECTION_MINIMIZED_KEY] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "Failed to clear section preference");
            }
        }
    }

    /// Last visitor count seen, used when the store is unreachable.
    pub fn local_visitor_count(&self) -> Option<i64> {
        self.store
            .get(VISITOR_COUNT_KEY)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn remember_visitor_count(&self, count: i64) {
        if let Err(e) = self.store.set(VISITOR_COUNT_KEY, &count.to_string()) {
            tracing::warn!(error = %e, "Failed to persist visitor count");
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.store.get(key).as_deref() == Some("true")
    }

    fn set_flag(&self, key: &str, value: bool) {
        let raw = if value { "true" } else { "false" };
        if let Err(e) = self.store.set(key, raw) {
            tracing::warn!(key, error = %e, "Failed to persist section preference");
        }
    }
}

fn read_set(store: &dyn KeyValueStore, key: &str) -> BTreeSet<String> {
    let Some(raw) = store.get(key) else {
        return BTreeSet::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "Ignoring malformed completion set");
        BTreeSet::new()
    })
}

fn write_set(store: &dyn KeyValueStore, key: &str, set: &BTreeSet<String>) {
    let result = serde_json::to_string(set)
        .map_err(io::Error::from)
        .and_then(|raw| store.set(key, &raw));
    if let Err(e) = result {
        tracing::warn!(key, error = %e, "Failed to persist completion set");
    }
}
