//! Bounded storage of admission cells.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::gcra::GcraCell;
use super::key::ThrottleKey;

/// Fixed-capacity keyed storage of [`GcraCell`]s.
///
/// Keys beyond the capacity evict the least recently used cell, so a
/// high-cardinality classification (per-client keys) cannot exhaust
/// memory. With the default by-path classification the key space is the
/// configured route set and eviction never triggers.
pub struct RateBudgetStore {
    cells: Mutex<LruCache<ThrottleKey, Arc<GcraCell>>>,
}

impl RateBudgetStore {
    /// Create a store holding at most `capacity` cells.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cells: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the cell for `key`, creating it on first use.
    ///
    /// Repeated calls with the same key return the same cell, so every
    /// handler task draws from one shared schedule per key.
    pub fn get_or_create(&self, key: &ThrottleKey) -> Arc<GcraCell> {
        let mut cells = self.cells.lock();

        if let Some(cell) = cells.get(key) {
            return Arc::clone(cell);
        }

        let cell = Arc::new(GcraCell::new());
        cells.put(key.clone(), Arc::clone(&cell));
        debug!(key = %key, "created admission cell");
        cell
    }

    /// Number of cells currently held.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    /// Whether the store holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_returns_same_cell() {
        let store = RateBudgetStore::new(16);
        let key = ThrottleKey::path("/a");

        let first = store.get_or_create(&key);
        let second = store.get_or_create(&key);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distinct_keys_get_distinct_cells() {
        let store = RateBudgetStore::new(16);

        let a = store.get_or_create(&ThrottleKey::path("/a"));
        let b = store.get_or_create(&ThrottleKey::path("/b"));

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = RateBudgetStore::new(2);
        let a = ThrottleKey::path("/a");

        let original = store.get_or_create(&a);
        store.get_or_create(&ThrottleKey::path("/b"));
        store.get_or_create(&ThrottleKey::path("/c"));

        assert_eq!(store.len(), 2);

        // "/a" was evicted; asking again builds a fresh cell.
        let recreated = store.get_or_create(&a);
        assert!(!Arc::ptr_eq(&original, &recreated));
    }
}
