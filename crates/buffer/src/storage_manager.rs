use std::path::Path;

use common::{DbError, DbResult};
use storage::PageManager;

use crate::buffer_pool::BufferPool;
use crate::{BufferStats, EvictedEntry};

/// The single public interface to pages: composes a `PageManager` and a
/// `BufferPool` and guarantees write-through-on-eviction. Every component
/// that needs page bytes (heap rows, B+Tree nodes) goes through a
/// `StorageManager` rather than a `PageManager` directly.
pub struct StorageManager {
    page_manager: PageManager,
    buffer_pool: BufferPool,
    is_shutdown: bool,
}

impl StorageManager {
    pub fn open(
        data_path: impl AsRef<Path>,
        meta_path: impl AsRef<Path>,
        buffer_pool_capacity: usize,
    ) -> DbResult<Self> {
        Ok(Self {
            page_manager: PageManager::open(data_path, meta_path)?,
            buffer_pool: BufferPool::new(buffer_pool_capacity),
            is_shutdown: false,
        })
    }

    fn check_open(&self) -> DbResult<()> {
        if self.is_shutdown {
            return Err(DbError::Storage(
                "storage manager is shut down".to_string(),
            ));
        }
        Ok(())
    }

    /// Cache hit returns the cached bytes; on a miss, reads through to disk
    /// and caches the result clean.
    pub fn read_page(&mut self, page_id: u64) -> DbResult<Vec<u8>> {
        self.check_open()?;
        if let Some(bytes) = self.buffer_pool.get(page_id) {
            return Ok(bytes);
        }
        let bytes = self.page_manager.read_from_disk(page_id)?;
        if let Some(evicted) = self.buffer_pool.put(page_id, bytes.clone(), false) {
            self.flush_evicted(evicted)?;
        }
        Ok(bytes)
    }

    /// Writes into the cache as dirty. Does not touch disk.
    pub fn write_page(&mut self, page_id: u64, bytes: Vec<u8>) -> DbResult<()> {
        self.check_open()?;
        if let Some(evicted) = self.buffer_pool.put(page_id, bytes, true) {
            self.flush_evicted(evicted)?;
        }
        Ok(())
    }

    pub fn allocate_page(&mut self) -> DbResult<u64> {
        self.check_open()?;
        self.page_manager.allocate()
    }

    /// Flushes the page if cached and dirty, removes it from the cache,
    /// then delegates to the Page Manager's free list.
    pub fn deallocate_page(&mut self, page_id: u64) -> DbResult<()> {
        self.check_open()?;
        if self.buffer_pool.is_dirty(page_id)
            && let Some(entry) = self.buffer_pool.remove(page_id)
        {
            self.page_manager.write_to_disk(page_id, &entry.data)?;
        } else {
            self.buffer_pool.remove(page_id);
        }
        self.page_manager.deallocate(page_id)?;
        Ok(())
    }

    /// Writes through to disk and clears the dirty flag, if the page is
    /// cached and dirty. A no-op otherwise.
    pub fn flush_page(&mut self, page_id: u64) -> DbResult<()> {
        self.check_open()?;
        if self.buffer_pool.is_dirty(page_id) {
            let bytes = self
                .buffer_pool
                .get(page_id)
                .expect("dirty implies present");
            self.page_manager.write_to_disk(page_id, &bytes)?;
            self.buffer_pool.clear_dirty(page_id);
        }
        Ok(())
    }

    pub fn flush_all_pages(&mut self) -> DbResult<()> {
        self.check_open()?;
        let dirty = self.buffer_pool.flush_all();
        for (page_id, bytes) in dirty {
            self.page_manager.write_to_disk(page_id, &bytes)?;
        }
        Ok(())
    }

    /// Flushes everything and marks the manager closed; idempotent.
    pub fn shutdown(&mut self) -> DbResult<()> {
        if self.is_shutdown {
            return Ok(());
        }
        self.flush_all_pages()?;
        self.is_shutdown = true;
        Ok(())
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer_pool.stats()
    }

    pub fn page_count(&self) -> usize {
        self.page_manager.page_count()
    }

    pub fn allocated_pages(&self) -> &[u64] {
        self.page_manager.allocated_pages()
    }

    fn flush_evicted(&mut self, evicted: EvictedEntry) -> DbResult<()> {
        if evicted.dirty {
            self.page_manager
                .write_to_disk(evicted.page_id, &evicted.data)?;
        }
        Ok(())
    }
}
