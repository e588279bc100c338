use std::num::NonZeroUsize;

use lru::LruCache;

/// A page evicted from the pool, handed back to the caller so it can be
/// flushed to disk if it was dirty.
#[derive(Debug, Clone)]
pub struct EvictedEntry {
    pub page_id: u64,
    pub data: Vec<u8>,
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferStats {
    pub hits: u64,
    pub misses: u64,
}

impl BufferStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    dirty: bool,
}

/// Bounded-capacity, pure in-memory LRU cache in front of a page manager.
/// `BufferPool` never touches disk itself — `StorageManager` owns that.
#[derive(Debug)]
pub struct BufferPool {
    cache: LruCache<u64, Entry>,
    stats: BufferStats,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: LruCache::new(capacity),
            stats: BufferStats::default(),
        }
    }

    /// Returns cached bytes and promotes the entry to MRU, or `None` on a
    /// miss. Updates hit/miss counters either way.
    pub fn get(&mut self, page_id: u64) -> Option<Vec<u8>> {
        match self.cache.get(&page_id) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.data.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn is_dirty(&self, page_id: u64) -> bool {
        self.cache.peek(&page_id).is_some_and(|e| e.dirty)
    }

    pub fn contains(&self, page_id: u64) -> bool {
        self.cache.contains(&page_id)
    }

    /// Inserts or updates `page_id`. `dirty=false` on an already-dirty entry
    /// does not clear the flag — only `clear_dirty`/a flush does that. If
    /// the pool is full and `page_id` is new, the LRU entry is evicted and
    /// returned so the caller can flush it.
    pub fn put(&mut self, page_id: u64, data: Vec<u8>, dirty: bool) -> Option<EvictedEntry> {
        if let Some(existing) = self.cache.peek_mut(&page_id) {
            existing.data = data;
            existing.dirty = existing.dirty || dirty;
            return None;
        }

        let evicted = if self.cache.len() == self.cache.cap().get() {
            self.cache.pop_lru()
        } else {
            None
        };

        self.cache.put(page_id, Entry { data, dirty });

        evicted.map(|(page_id, entry)| EvictedEntry {
            page_id,
            data: entry.data,
            dirty: entry.dirty,
        })
    }

    pub fn mark_dirty(&mut self, page_id: u64) {
        if let Some(entry) = self.cache.peek_mut(&page_id) {
            entry.dirty = true;
        }
    }

    pub fn clear_dirty(&mut self, page_id: u64) {
        if let Some(entry) = self.cache.peek_mut(&page_id) {
            entry.dirty = false;
        }
    }

    /// Returns every currently dirty entry and clears their flags. Does not
    /// write anything to disk; the caller (`StorageManager`) does that.
    pub fn flush_all(&mut self) -> Vec<(u64, Vec<u8>)> {
        let mut flushed = Vec::new();
        for (&page_id, entry) in self.cache.iter_mut() {
            if entry.dirty {
                flushed.push((page_id, entry.data.clone()));
                entry.dirty = false;
            }
        }
        flushed
    }

    /// Evicts `page_id` without flushing, returning its bytes and dirty flag
    /// so the caller can flush it if needed.
    pub fn remove(&mut self, page_id: u64) -> Option<EvictedEntry> {
        self.cache.pop(&page_id).map(|entry| EvictedEntry {
            page_id,
            data: entry.data,
            dirty: entry.dirty,
        })
    }

    /// Drops all entries without flushing. Used only in tests and on
    /// explicit reset.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
