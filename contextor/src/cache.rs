//! Bounded response cache: relevance scores and generated answers.
//!
//! Keys are SHA-256 digests of normalized inputs. Each table is split into
//! shards with their own LRU and mutex, so eviction in one shard never waits
//! on another. Entries are write-once.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use sha2::{Digest, Sha256};
use tracing::debug;

const SHARDS: usize = 16;

/// Digest of normalized cache inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Relevance of one passage to one query.
    pub fn relevance(query: &str, passage: &str) -> Self {
        Self::digest("relevance", &[&normalize(query), passage.trim()])
    }

    /// Answer to `query` over a context identified by its fingerprint.
    pub fn answer(query: &str, context_fingerprint: &str) -> Self {
        Self::digest("answer", &[&normalize(query), context_fingerprint])
    }

    fn digest(tag: &str, parts: &[&str]) -> Self {
        let mut h = Sha256::new();
        h.update(tag.as_bytes());
        for p in parts {
            h.update([0u8]);
            h.update(p.as_bytes());
        }
        Self(h.finalize().into())
    }

    fn shard(&self) -> usize {
        self.0[0] as usize % SHARDS
    }
}

/// Trim, lowercase, collapse whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct Table<V> {
    shards: Vec<Mutex<LruCache<CacheKey, V>>>,
}

impl<V: Clone> Table<V> {
    fn new(capacity: usize) -> Self {
        let per_shard = NonZeroUsize::new(capacity.div_ceil(SHARDS)).unwrap_or(NonZeroUsize::MIN);
        Self {
            shards: (0..SHARDS)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<V> {
        self.shards[key.shard()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: CacheKey, value: V) {
        let mut shard = self.shards[key.shard()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !shard.contains(&key) {
            shard.put(key, value);
        }
    }

    fn clear(&self) {
        for s in &self.shards {
            s.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

/// Relevance and answer tables behind one on/off switch.
pub struct ResponseCache {
    enabled: AtomicBool,
    relevance: Table<f32>,
    answers: Table<String>,
}

impl ResponseCache {
    /// `capacity` bounds each table.
    pub fn new(capacity: usize, enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            relevance: Table::new(capacity),
            answers: Table::new(capacity),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Switching the cache off or on also empties it.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
        self.clear();
    }

    pub fn relevance(&self, key: &CacheKey) -> Option<f32> {
        self.is_enabled().then(|| self.relevance.get(key)).flatten()
    }

    pub fn put_relevance(&self, key: CacheKey, score: f32) {
        if self.is_enabled() {
            self.relevance.put(key, score);
        }
    }

    pub fn answer(&self, key: &CacheKey) -> Option<String> {
        self.is_enabled().then(|| self.answers.get(key)).flatten()
    }

    pub fn put_answer(&self, key: CacheKey, answer: String) {
        if self.is_enabled() {
            self.answers.put(key, answer);
        }
    }

    pub fn clear(&self) {
        self.relevance.clear();
        self.answers.clear();
        debug!("response cache cleared");
    }

    /// `(relevance entries, answer entries)`.
    pub fn len(&self) -> (usize, usize) {
        (self.relevance.len(), self.answers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_normalize_the_query() {
        assert_eq!(
            CacheKey::relevance("  What is  RAG? ", "passage"),
            CacheKey::relevance("what is rag?", " passage ")
        );
        assert_ne!(
            CacheKey::relevance("q", "passage"),
            CacheKey::answer("q", "passage")
        );
    }

    #[test]
    fn entries_are_write_once() {
        let cache = ResponseCache::new(10, true);
        let k = CacheKey::answer("q", "ctx");
        cache.put_answer(k, "first".into());
        cache.put_answer(k, "second".into());
        assert_eq!(cache.answer(&k).as_deref(), Some("first"));
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = ResponseCache::new(10, false);
        let k = CacheKey::relevance("q", "p");
        cache.put_relevance(k, 0.5);
        assert_eq!(cache.relevance(&k), None);

        cache.set_enabled(true);
        cache.put_relevance(k, 0.5);
        assert_eq!(cache.relevance(&k), Some(0.5));
        cache.set_enabled(false);
        assert_eq!(cache.len(), (0, 0));
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = ResponseCache::new(32, true);
        for i in 0..1000 {
            cache.put_relevance(CacheKey::relevance("q", &format!("p{i}")), 0.1);
        }
        let (rel, _) = cache.len();
        assert!(rel <= 32, "{rel} entries");
        assert!(rel > 0);
    }
}
