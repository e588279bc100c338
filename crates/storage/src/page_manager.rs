use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::DbResult;
use serde::{Deserialize, Serialize};

use crate::PAGE_SIZE;

/// Allocation bookkeeping persisted alongside the data file as a JSON
/// sidecar. Page ids are 1-based; `next_page_id` is the id that will be
/// handed out the next time the free list is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageManagerMetadata {
    pub next_page_id: u64,
    pub free_pages: VecDeque<u64>,
    pub allocated_pages: Vec<u64>,
}

impl Default for PageManagerMetadata {
    fn default() -> Self {
        Self {
            next_page_id: 1,
            free_pages: VecDeque::new(),
            allocated_pages: Vec::new(),
        }
    }
}

/// Result of a `deallocate` call: whether the page actually moved from
/// allocated to free, or the id was already free (a no-op).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    Freed,
    AlreadyFree,
}

/// Owns a backing data file and the authoritative page-allocation state for
/// it. Nothing outside `PageManager` touches `data_path`/`meta_path`
/// directly (§4.1).
pub struct PageManager {
    data_path: PathBuf,
    meta_path: PathBuf,
    data_file: File,
    metadata: PageManagerMetadata,
}

impl PageManager {
    pub fn open(data_path: impl AsRef<Path>, meta_path: impl AsRef<Path>) -> DbResult<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        let meta_path = meta_path.as_ref().to_path_buf();

        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)?;

        let metadata = Self::load_metadata(&meta_path)?;

        Ok(Self {
            data_path,
            meta_path,
            data_file,
            metadata,
        })
    }

    fn load_metadata(meta_path: &Path) -> DbResult<PageManagerMetadata> {
        if !meta_path.exists() {
            return Ok(PageManagerMetadata::default());
        }
        let raw = std::fs::read_to_string(meta_path)?;
        if raw.trim().is_empty() {
            return Ok(PageManagerMetadata::default());
        }
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    /// Best-effort metadata persistence: a lost write here can leak a page
    /// id after a crash, but never corrupts already-written page bytes.
    fn save_metadata(&self) -> DbResult<()> {
        let json = serde_json::to_string_pretty(&self.metadata)
            .expect("PageManagerMetadata is always serializable");
        std::fs::write(&self.meta_path, json)?;
        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Returns the head of the free list if non-empty, else the next fresh
    /// id. Adds the id to `allocated_pages` and persists metadata.
    pub fn allocate(&mut self) -> DbResult<u64> {
        let page_id = if let Some(id) = self.metadata.free_pages.pop_front() {
            id
        } else {
            let id = self.metadata.next_page_id;
            self.metadata.next_page_id += 1;
            id
        };
        self.metadata.allocated_pages.push(page_id);
        self.save_metadata()?;
        Ok(page_id)
    }

    /// Removes `page_id` from `allocated_pages` and appends it to
    /// `free_pages`. A page that is not currently allocated is reported as
    /// `AlreadyFree` rather than treated as an error.
    pub fn deallocate(&mut self, page_id: u64) -> DbResult<FreeOutcome> {
        let Some(pos) = self
            .metadata
            .allocated_pages
            .iter()
            .position(|&id| id == page_id)
        else {
            return Ok(FreeOutcome::AlreadyFree);
        };
        self.metadata.allocated_pages.remove(pos);
        if !self.metadata.free_pages.contains(&page_id) {
            self.metadata.free_pages.push_back(page_id);
        }
        self.save_metadata()?;
        Ok(FreeOutcome::Freed)
    }

    pub fn is_allocated(&self, page_id: u64) -> bool {
        self.metadata.allocated_pages.contains(&page_id)
    }

    pub fn allocated_pages(&self) -> &[u64] {
        &self.metadata.allocated_pages
    }

    pub fn page_count(&self) -> usize {
        self.metadata.allocated_pages.len()
    }

    fn offset_of(page_id: u64) -> u64 {
        (page_id - 1) * PAGE_SIZE as u64
    }

    /// Never fails on a logical miss: an id beyond EOF (or a short final
    /// read) comes back zero-padded to exactly `PAGE_SIZE`.
    pub fn read_from_disk(&mut self, page_id: u64) -> DbResult<Vec<u8>> {
        let mut buf = vec![0u8; PAGE_SIZE];
        let offset = Self::offset_of(page_id);
        if self.data_file.seek(SeekFrom::Start(offset)).is_err() {
            return Ok(buf);
        }
        let mut read_buf = vec![0u8; PAGE_SIZE];
        match self.data_file.read(&mut read_buf) {
            Ok(n) => {
                buf[..n].copy_from_slice(&read_buf[..n]);
                Ok(buf)
            }
            Err(_) => Ok(buf),
        }
    }

    pub fn write_to_disk(&mut self, page_id: u64, bytes: &[u8]) -> DbResult<()> {
        let mut payload = vec![0u8; PAGE_SIZE];
        let n = bytes.len().min(PAGE_SIZE);
        payload[..n].copy_from_slice(&bytes[..n]);

        let offset = Self::offset_of(page_id);
        let file_len = self.data_file.metadata()?.len();
        if file_len < offset {
            self.data_file.set_len(offset)?;
        }
        self.data_file.seek(SeekFrom::Start(offset))?;
        self.data_file.write_all(&payload)?;
        self.data_file.flush()?;
        Ok(())
    }
}
