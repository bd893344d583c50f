//! In-memory LRU cache for decoded pages.

use std::sync::Arc;

use hashlink::LruCache;

use crate::codec::DecodedImage;
use crate::types::{CacheBudget, ImageKey, PageId};

/// Decoded frame associated with a single page.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub page: PageId,
    pub image: Arc<DecodedImage>,
}

impl CacheEntry {
    pub fn new(page: PageId, image: Arc<DecodedImage>) -> Self {
        Self { page, image }
    }

    fn cost(&self) -> usize {
        self.image.byte_len()
    }
}

/// LRU keyed by [`ImageKey`] that evicts the least recently used pages once the byte budget is
/// exceeded.
#[derive(Debug)]
pub struct MemoryCache {
    entries: LruCache<ImageKey, CacheEntry>,
    budget: CacheBudget,
    bytes_used: usize,
}

impl MemoryCache {
    /// Construct a cache with the provided memory budget.
    pub fn new(budget: CacheBudget) -> Self {
        Self { entries: LruCache::new_unbounded(), budget, bytes_used: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total memory consumption tracked by the cache.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn budget(&self) -> CacheBudget {
        self.budget
    }

    /// Retrieve an entry, refreshing its recency ordering if present.
    pub fn get(&mut self, key: &ImageKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Membership test that leaves the recency ordering untouched.
    pub fn contains(&self, key: &ImageKey) -> bool {
        self.entries.peek(key).is_some()
    }

    /// Insert or replace an entry. Returns `false` when the entry alone exceeds the budget and
    /// was therefore not stored.
    pub fn insert(&mut self, key: ImageKey, entry: CacheEntry) -> bool {
        let cost = entry.cost();
        if cost > self.budget.bytes_max {
            return false;
        }

        if let Some(existing) = self.entries.remove(&key) {
            self.bytes_used = self.bytes_used.saturating_sub(existing.cost());
        }

        self.bytes_used += cost;
        self.entries.insert(key, entry);
        self.evict_if_needed();
        true
    }

    /// Remove an entry from the cache if present.
    pub fn remove(&mut self, key: &ImageKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if let Some(ref entry) = removed {
            self.bytes_used = self.bytes_used.saturating_sub(entry.cost());
        }
        removed
    }

    fn evict_if_needed(&mut self) {
        while self.bytes_used > self.budget.bytes_max {
            match self.entries.remove_lru() {
                Some((_key, oldest)) => {
                    self.bytes_used = self.bytes_used.saturating_sub(oldest.cost());
                }
                None => break,
            }
        }
    }
}
