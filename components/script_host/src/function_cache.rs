//! Named functions compiled into every pooled instance

use indexmap::IndexMap;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

/// A cached function body and the hash it is known by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCacheEntry {
    /// Global name the function is defined under
    pub name: String,
    /// SHA-256 of the body, lowercase hex
    pub hash: String,
    /// Function body
    pub code: String,
}

impl FunctionCacheEntry {
    /// Entry for `code` under `name`
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            hash: hash_source(code),
            code: code.to_string(),
        }
    }

    /// Chunk defining the function as a global
    pub fn wrapped_source(&self) -> String {
        wrap_function_source(&self.name, &self.code)
    }
}

/// SHA-256 of `code` as lowercase hex
pub fn hash_source(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.as_bytes()))
}

/// Wrap a function body into a chunk defining `name`
pub fn wrap_function_source(name: &str, code: &str) -> String {
    format!("function {}(...)\n{}\nend", name, code)
}

#[derive(Debug)]
struct Slot {
    entry: FunctionCacheEntry,
    /// Run at least once since this body was loaded
    executed: bool,
}

/// The persisted function entries, in load order
#[derive(Debug, Default)]
pub struct FunctionCache {
    entries: RwLock<IndexMap<String, Slot>>,
}

impl FunctionCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry of `name`
    pub fn get(&self, name: &str) -> Option<FunctionCacheEntry> {
        self.entries.read().get(name).map(|s| s.entry.clone())
    }

    /// Hash `name` was last loaded with
    pub fn hash_of(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).map(|s| s.entry.hash.clone())
    }

    /// Add or replace an entry; a changed body counts as never executed
    pub fn insert(&self, entry: FunctionCacheEntry) {
        let mut entries = self.entries.write();
        let executed = entries
            .get(&entry.name)
            .is_some_and(|s| s.executed && s.entry.hash == entry.hash);
        entries.insert(entry.name.clone(), Slot { entry, executed });
    }

    /// Record a run of `name` compiled from `hash`
    ///
    /// Returns true when that body already ran before, i.e. this run is
    /// served from the cache. Hashes other than the current one are ignored.
    pub fn mark_executed(&self, name: &str, hash: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(slot) if slot.entry.hash == hash => std::mem::replace(&mut slot.executed, true),
            _ => false,
        }
    }

    /// Remove `name`
    pub fn remove(&self, name: &str) -> Option<FunctionCacheEntry> {
        self.entries.write().shift_remove(name).map(|s| s.entry)
    }

    /// Every entry, in load order
    pub fn entries(&self) -> Vec<FunctionCacheEntry> {
        self.entries.read().values().map(|s| s.entry.clone()).collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
