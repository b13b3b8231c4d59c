//! Bounded LRU caching for generated SQL text.
//!
//! Entries carry a use tick instead of a timestamp so recency is strict even
//! when two accesses land within the same clock reading.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A cached SQL string.
#[derive(Debug, Clone)]
pub struct CachedStatement {
    /// The generated SQL text, shared with every caller that hits it.
    pub sql: Arc<str>,
    /// Tick of the last access.
    pub last_used: u64,
}

/// LRU cache for generated SQL text.
///
/// When an insert would exceed `max_size`, the least-recently-used entry is
/// evicted. Every hit refreshes recency.
///
/// # Example
///
/// ```
/// use relmap_query::cache::LruCache;
///
/// let mut cache = LruCache::new(100);
///
/// assert!(cache.get(&"hero").is_none());
///
/// let sql: std::sync::Arc<str> = "SELECT hero.id FROM hero".into();
/// assert_eq!(cache.insert("hero", sql.clone()), None);
///
/// // a hit returns the same shared string
/// let again = cache.get(&"hero").expect("cached");
/// assert!(std::sync::Arc::ptr_eq(&sql, &again));
/// ```
#[derive(Debug)]
pub struct LruCache<K> {
    cache: HashMap<K, CachedStatement>,
    max_size: usize,
    tick: u64,
}

impl<K: Eq + Hash + Clone> LruCache<K> {
    /// Create a new cache with the given maximum number of entries.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            cache: HashMap::with_capacity(max_size.min(256)),
            max_size,
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up an entry, refreshing its recency on a hit.
    pub fn get(&mut self, key: &K) -> Option<Arc<str>> {
        let tick = self.next_tick();
        let entry = self.cache.get_mut(key)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.sql))
    }

    /// Store an entry, replacing any previous text for the key.
    ///
    /// Returns the key of the entry evicted to make room, if any.
    pub fn insert(&mut self, key: K, sql: Arc<str>) -> Option<K> {
        let evicted = if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru()
        } else {
            None
        };
        let tick = self.next_tick();
        self.cache.insert(
            key,
            CachedStatement {
                sql,
                last_used: tick,
            },
        );
        evicted
    }

    /// Check if a statement is cached without touching its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Clear all cached statements.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn evict_lru(&mut self) -> Option<K> {
        let lru_key = self
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone())?;
        self.cache.remove(&lru_key);
        Some(lru_key)
    }
}

impl<K: Eq + Hash + Clone> Default for LruCache<K> {
    fn default() -> Self {
        Self::new(500)
    }
}
