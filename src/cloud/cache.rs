// SPDX-License-Identifier: GPL-3.0-only

//! Parsed effect cache
//!
//! Entries are keyed by the effect file path and ordered by last access.
//! The total is bounded by a byte ceiling measured on the source files.

use crate::errors::SdkResult;
use crate::filters::LoadedEffect;
use lru::LruCache;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

struct CacheEntry {
    effect: Arc<LoadedEffect>,
    size_bytes: u64,
}

/// Cache counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
    pub automatic_cleanup: bool,
}

/// LRU cache of loaded effects
pub struct FilterCache {
    entries: LruCache<String, CacheEntry>,
    size_bytes: u64,
    max_size_bytes: u64,
    automatic_cleanup: bool,
}

impl FilterCache {
    pub fn new(max_size_bytes: u64, automatic_cleanup: bool) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size_bytes: 0,
            max_size_bytes,
            automatic_cleanup,
        }
    }

    /// Look up an entry, marking it most recently used
    pub fn get(&mut self, key: &str) -> Option<Arc<LoadedEffect>> {
        self.entries.get(key).map(|entry| Arc::clone(&entry.effect))
    }

    /// Insert or replace an entry
    ///
    /// With automatic cleanup on, older entries are evicted until the total
    /// fits the ceiling; an entry larger than the ceiling is not retained.
    pub fn insert(&mut self, key: impl Into<String>, effect: Arc<LoadedEffect>, size_bytes: u64) {
        let key = key.into();
        if let Some(old) = self.entries.put(key, CacheEntry { effect, size_bytes }) {
            self.size_bytes -= old.size_bytes;
        }
        self.size_bytes += size_bytes;
        if self.automatic_cleanup {
            self.evict_to(self.max_size_bytes);
        }
    }

    /// Return the cached effect for `path`, loading and caching it on a miss
    pub fn get_or_load(&mut self, path: &Path) -> SdkResult<Arc<LoadedEffect>> {
        let key = path.to_string_lossy().into_owned();
        if let Some(effect) = self.get(&key) {
            debug!(path = %path.display(), "Effect cache hit");
            return Ok(effect);
        }
        let effect = Arc::new(LoadedEffect::load(path)?);
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.insert(key, Arc::clone(&effect), size_bytes);
        Ok(effect)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Drop the entry keyed by `name`, or the first entry whose effect is named `name`
    pub fn clear_entry(&mut self, name: &str) -> bool {
        let key = if self.entries.contains(name) {
            Some(name.to_string())
        } else {
            self.entries
                .iter()
                .find(|(_, entry)| entry.effect.name() == name)
                .map(|(key, _)| key.clone())
        };
        match key.and_then(|key| self.entries.pop(&key)) {
            Some(entry) => {
                self.size_bytes -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }

    pub fn set_max_size(&mut self, max_size_bytes: u64) {
        self.max_size_bytes = max_size_bytes;
        if self.automatic_cleanup {
            self.evict_to(max_size_bytes);
        }
    }

    pub fn set_automatic_cleanup(&mut self, enabled: bool) {
        self.automatic_cleanup = enabled;
        if enabled {
            self.evict_to(self.max_size_bytes);
        }
    }

    /// Trim to half of the ceiling, returning the number of evicted entries
    pub fn force_cleanup(&mut self) -> usize {
        self.evict_to(self.max_size_bytes / 2)
    }

    /// Evict least recently used entries until the total is at most `limit`
    fn evict_to(&mut self, limit: u64) -> usize {
        let mut evicted = 0;
        while self.size_bytes > limit {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.size_bytes -= entry.size_bytes;
            evicted += 1;
            debug!(key = %key, size = entry.size_bytes, "Evicted cached effect");
        }
        evicted
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.count(),
            size_bytes: self.size_bytes,
            max_size_bytes: self.max_size_bytes,
            automatic_cleanup: self.automatic_cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(name: &str) -> Arc<LoadedEffect> {
        let json = format!(r#"{{ "name": "{}", "passes": [{{ "id": 0, "kind": "mono" }}] }}"#, name);
        Arc::new(LoadedEffect::parse(json.as_bytes(), name).unwrap())
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let mut cache = FilterCache::new(300, true);
        cache.insert("a", effect("a"), 100);
        cache.insert("b", effect("b"), 100);
        cache.insert("c", effect("c"), 100);
        assert!(cache.get("a").is_some());

        cache.insert("d", effect("d"), 100);
        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
        assert_eq!(cache.size_bytes(), 300);
    }

    #[test]
    fn test_manual_mode_exceeds_ceiling_until_forced() {
        let mut cache = FilterCache::new(200, false);
        for name in ["a", "b", "c", "d"] {
            cache.insert(name, effect(name), 100);
        }
        assert_eq!(cache.size_bytes(), 400);

        assert_eq!(cache.force_cleanup(), 3);
        assert_eq!(cache.count(), 1);
        assert!(cache.contains("d"));
    }

    #[test]
    fn test_clear_entry_by_effect_name() {
        let mut cache = FilterCache::new(1000, true);
        cache.insert("/tmp/glow.fx.json", effect("Glow"), 50);
        assert!(cache.clear_entry("Glow"));
        assert!(!cache.clear_entry("Glow"));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_get_or_load_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.fx.json");
        std::fs::write(&path, r#"{ "name": "A", "passes": [{ "id": 0, "kind": "sepia" }] }"#).unwrap();

        let mut cache = FilterCache::new(1 << 20, true);
        let first = cache.get_or_load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = cache.get_or_load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.count(), 1);
        assert!(cache.size_bytes() > 0);
    }
}
