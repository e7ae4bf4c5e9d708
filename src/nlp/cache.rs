//! Content-addressed extraction cache with a soft capacity.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use serde::Serialize;

use crate::nlp::ExtractionResult;

/// BLAKE3 digest of the raw input text.
pub type ContentHash = [u8; 32];

pub fn content_hash(text: &str) -> ContentHash {
    *blake3::hash(text.as_bytes()).as_bytes()
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Results keyed by content hash.
///
/// Once `capacity` entries are stored, further unique inputs are not cached;
/// nothing is ever evicted.
#[derive(Debug)]
pub struct ExtractionCache {
    entries: Mutex<HashMap<ContentHash, ExtractionResult>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExtractionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &ContentHash) -> Option<ExtractionResult> {
        let found = self.entries.lock().get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `result` unless the cache is full and return the entry callers
    /// should see. An existing entry for `key` wins over `result`, so
    /// concurrent misses on one text converge on the first stored result.
    pub fn get_or_insert(&self, key: ContentHash, result: ExtractionResult) -> ExtractionResult {
        let mut entries = self.entries.lock();
        if let Some(stored) = entries.get(&key) {
            return stored.clone();
        }
        if entries.len() < self.capacity {
            entries.insert(key, result.clone());
        }
        result
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.lock().contains_key(&content_hash(text))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            size: self.len(),
            max_size: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::nlp::{Entities, Tier};

    fn result(text: &str) -> ExtractionResult {
        ExtractionResult::new(text, Entities::default(), 0.5, Tier::Lightweight)
    }

    #[test]
    fn hash_is_deterministic_and_content_sensitive() {
        assert_eq!(content_hash("fever"), content_hash("fever"));
        assert_ne!(content_hash("fever"), content_hash("Fever"));
    }

    #[test]
    fn soft_cap_rejects_new_keys_without_evicting() {
        let cache = ExtractionCache::new(2);
        cache.get_or_insert(content_hash("a"), result("a"));
        cache.get_or_insert(content_hash("b"), result("b"));
        let rejected = cache.get_or_insert(content_hash("c"), result("c"));
        assert_eq!(rejected.text, "c");
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("c"));
    }

    #[test]
    fn first_insert_wins_and_is_returned_to_later_writers() {
        let cache = ExtractionCache::new(4);
        let key = content_hash("a");
        let mut second = result("a");
        second.confidence = 0.9;
        second.extraction_time = Duration::from_millis(7);
        cache.get_or_insert(key, result("a"));

        let seen = cache.get_or_insert(key, second);
        assert_eq!(seen, result("a"));
        assert_eq!(seen.extraction_time, Duration::ZERO);
        assert!((cache.get(&key).unwrap().confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = ExtractionCache::new(4);
        let key = content_hash("a");
        assert!(cache.get(&key).is_none());
        cache.get_or_insert(key, result("a"));
        assert!(cache.get(&key).is_some());
        let status = cache.status();
        assert_eq!((status.hits, status.misses), (1, 1));
    }
}
