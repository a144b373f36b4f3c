//! Per-connection prepared statement cache.

use lru::LruCache;
use std::num::NonZeroUsize;
use unidb_driver::StatementId;

/// LRU map from SQL text to a prepared statement handle.
#[derive(Debug)]
pub(crate) struct StatementCache {
    entries: Option<LruCache<String, StatementId>>,
}

impl StatementCache {
    /// Creates a cache holding up to `capacity` statements (0 disables it).
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    /// Looks up `sql`, marking it most recently used.
    pub(crate) fn get(&mut self, sql: &str) -> Option<StatementId> {
        self.entries.as_mut()?.get(sql).copied()
    }

    /// Caches `id` for `sql`; returns the handle evicted to make room.
    pub(crate) fn insert(&mut self, sql: String, id: StatementId) -> Option<StatementId> {
        let Some(entries) = self.entries.as_mut() else {
            return Some(id);
        };
        match entries.push(sql.clone(), id) {
            // Re-preparing the same text replaces its handle.
            Some((key, old)) if key == sql => (old != id).then_some(old),
            Some((_, evicted)) => Some(evicted),
            None => None,
        }
    }

    /// Empties the cache, returning every handle so it can be closed.
    pub(crate) fn drain(&mut self) -> Vec<StatementId> {
        let Some(entries) = self.entries.as_mut() else {
            return Vec::new();
        };
        let mut ids = Vec::with_capacity(entries.len());
        while let Some((_, id)) = entries.pop_lru() {
            ids.push(id);
        }
        ids
    }
}
