use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::Result;
use crate::domain::CacheEntry;
use crate::session::Clock;
use crate::store::write_atomic;

const CACHE_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

struct Slot {
    entry: CacheEntry,
    // Breaks ties between entries created within the same clock tick.
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl CacheState {
    fn insert(&mut self, entry: CacheEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots
            .insert(entry.canonical_key.clone(), Slot { entry, seq });
    }

    /// Drop the oldest entries until at most `max_entries` remain.
    fn evict(&mut self, max_entries: usize) -> usize {
        if self.slots.len() <= max_entries {
            return 0;
        }

        let mut by_age: Vec<_> = self
            .slots
            .values()
            .map(|s| (s.entry.created_at, s.seq, s.entry.canonical_key.clone()))
            .collect();
        by_age.sort();

        let excess = self.slots.len() - max_entries;
        for (_, _, key) in by_age.into_iter().take(excess) {
            self.slots.remove(&key);
        }
        excess
    }
}

/// Persistent map from canonical key to generated affiliate link.
///
/// Bounded to `max_entries`; every `put` evicts the oldest entries beyond the
/// bound and then rewrites the cache file. A missing or corrupt file loads as
/// an empty cache, and a failed write only costs durability: the in-memory
/// map stays authoritative.
pub struct LinkCache {
    path: Option<PathBuf>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    state: RwLock<CacheState>,
    persist_lock: Mutex<()>,
}

impl LinkCache {
    /// Open the cache backed by `path`, loading whatever it already holds
    pub fn open(path: impl Into<PathBuf>, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let cache = Self {
            path: Some(path.into()),
            max_entries: max_entries.max(1),
            clock,
            state: RwLock::new(CacheState::default()),
            persist_lock: Mutex::new(()),
        };
        cache.load();
        cache
    }

    /// Cache without a backing file
    pub fn in_memory(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: None,
            max_entries: max_entries.max(1),
            clock,
            state: RwLock::new(CacheState::default()),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read_state()
            .slots
            .get(key)
            .map(|slot| slot.entry.generated_link.clone())
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.read_state()
            .slots
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    /// Insert or overwrite the entry for `key`, evict, and persist.
    pub fn put(&self, key: &str, original_url: &str, generated_link: &str) {
        let entry = CacheEntry::new(key, original_url, generated_link, self.clock.now());

        let evicted = {
            let mut state = self.write_state();
            state.insert(entry);
            state.evict(self.max_entries)
        };
        if evicted > 0 {
            debug!("Evicted {} cache entries (capacity {})", evicted, self.max_entries);
        }

        if let Err(e) = self.persist() {
            warn!("Failed to persist link cache: {}", e);
        }
    }

    /// Replace the in-memory map with the contents of the cache file.
    ///
    /// Returns the number of entries loaded. Never fails.
    pub fn load(&self) -> usize {
        let Some(path) = self.path.as_deref() else {
            return 0;
        };

        let entries = match read_cache_file(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable link cache {}: {}", path.display(), e);
                Vec::new()
            }
        };

        let mut fresh = CacheState::default();
        let mut entries = entries;
        entries.sort_by_key(|e| e.created_at);
        for entry in entries {
            fresh.insert(entry);
        }
        fresh.evict(self.max_entries);

        let loaded = fresh.slots.len();
        *self.write_state() = fresh;
        debug!("Loaded {} link cache entries from {}", loaded, path.display());
        loaded
    }

    /// Write a consistent snapshot of the whole map to the cache file.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        // Snapshot under the persist lock so the last writer always writes the newest map.
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let file = CacheFile {
            version: CACHE_FILE_VERSION,
            entries: self.snapshot(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read_state().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, newest first
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries = self.snapshot();
        entries.reverse();
        entries
    }

    /// All entries, oldest first
    fn snapshot(&self) -> Vec<CacheEntry> {
        let state = self.read_state();
        let mut slots: Vec<&Slot> = state.slots.values().collect();
        slots.sort_by_key(|s| (s.entry.created_at, s.seq));
        slots.into_iter().map(|s| s.entry.clone()).collect()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_cache_file(path: &Path) -> Result<Vec<CacheEntry>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let file: CacheFile = serde_json::from_slice(&bytes)?;
    if file.version != CACHE_FILE_VERSION {
        warn!(
            "Link cache {} has version {}, expected {}",
            path.display(),
            file.version,
            CACHE_FILE_VERSION
        );
    }
    Ok(file.entries)
}
