use std::path::{Path, PathBuf};

use common::{DbError, DbResult, PageId, RecordId, Row};
use storage::{Page, Slot};

use crate::StorageManager;

fn row_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

fn encode_row(row: &Row) -> DbResult<Vec<u8>> {
    bincode::serde::encode_to_vec(row.values.as_slice(), row_config())
        .map_err(|e| DbError::Storage(format!("encode row failed: {e}")))
}

fn decode_row(bytes: &[u8]) -> DbResult<Row> {
    let (values, _) = bincode::serde::decode_from_slice(bytes, row_config())
        .map_err(|e| DbError::Storage(format!("decode row failed: {e}")))?;
    Ok(Row::new(values))
}

/// Row-oriented access over a single backing file's slotted pages.
/// Insert/update/delete and point lookups by `RecordId`.
pub trait HeapTable {
    fn insert(&mut self, row: &Row) -> DbResult<RecordId>;
    fn get(&mut self, rid: RecordId) -> DbResult<Row>;
    /// Deletes the old slot and appends the row elsewhere; a heap file
    /// never does in-place variable-length updates.
    fn update(&mut self, rid: RecordId, row: &Row) -> DbResult<RecordId>;
    fn delete(&mut self, rid: RecordId) -> DbResult<()>;
    /// Every live (non-deleted) row in the file, in page/slot order. The
    /// sole access path for a sequential scan.
    fn scan(&mut self) -> DbResult<Vec<(RecordId, Row)>>;
    fn flush(&mut self) -> DbResult<()>;
}

/// A heap file is a sequence of slotted pages addressed through a
/// `StorageManager`. New rows are appended to the current tail page;
/// once it is full a fresh page is allocated and becomes the new tail.
pub struct HeapFile {
    storage: StorageManager,
    current_page: Option<u64>,
}

const DEFAULT_BUFFER_CAPACITY: usize = 64;

impl HeapFile {
    pub fn open(path: impl AsRef<Path>, table_id: u64) -> DbResult<Self> {
        Self::open_with_capacity(path, table_id, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn open_with_capacity(
        path: impl AsRef<Path>,
        _table_id: u64,
        buffer_pool_capacity: usize,
    ) -> DbResult<Self> {
        let data_path = path.as_ref().to_path_buf();
        let meta_path = meta_path_for(&data_path);
        let storage = StorageManager::open(&data_path, &meta_path, buffer_pool_capacity)?;
        let current_page = storage.allocated_pages().iter().copied().max();
        Ok(Self {
            storage,
            current_page,
        })
    }

    fn load_page(&mut self, page_id: u64) -> DbResult<Page> {
        let bytes = self.storage.read_page(page_id)?;
        Ok(Page::from_raw(page_id, bytes))
    }

    fn save_page(&mut self, page: &Page) -> DbResult<()> {
        self.storage.write_page(page.id, page.data.clone())
    }

    fn tail_page(&mut self, payload_len: usize) -> DbResult<Page> {
        if let Some(page_id) = self.current_page {
            let page = self.load_page(page_id)?;
            if page.can_fit(payload_len)? {
                return Ok(page);
            }
        }
        let page_id = self.storage.allocate_page()?;
        self.current_page = Some(page_id);
        Ok(Page::new(page_id))
    }
}

impl HeapTable for HeapFile {
    fn insert(&mut self, row: &Row) -> DbResult<RecordId> {
        let bytes = encode_row(row)?;
        let mut page = self.tail_page(bytes.len())?;
        let slot = page.append_tuple(&bytes)?;
        self.save_page(&page)?;
        Ok(RecordId {
            page_id: PageId(page.id),
            slot,
        })
    }

    fn get(&mut self, rid: RecordId) -> DbResult<Row> {
        let page = self.load_page(rid.page_id.0)?;
        let slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage(format!(
                "record {rid:?} has been deleted"
            )));
        }
        decode_row(page.tuple_bytes(&slot))
    }

    fn update(&mut self, rid: RecordId, row: &Row) -> DbResult<RecordId> {
        self.delete(rid)?;
        self.insert(row)
    }

    fn delete(&mut self, rid: RecordId) -> DbResult<()> {
        let mut page = self.load_page(rid.page_id.0)?;
        let slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage(format!(
                "record {rid:?} already deleted"
            )));
        }
        page.write_slot(rid.slot, &Slot { offset: 0, len: 0 })?;
        self.save_page(&page)
    }

    fn scan(&mut self) -> DbResult<Vec<(RecordId, Row)>> {
        let mut page_ids: Vec<u64> = self.storage.allocated_pages().to_vec();
        page_ids.sort_unstable();

        let mut rows = Vec::new();
        for page_id in page_ids {
            let page = self.load_page(page_id)?;
            let header = page.header()?;
            for slot_idx in 0..header.num_slots {
                let slot = page.read_slot(slot_idx)?;
                if slot.is_empty() {
                    continue;
                }
                let row = decode_row(page.tuple_bytes(&slot))?;
                rows.push((
                    RecordId {
                        page_id: PageId(page_id),
                        slot: slot_idx,
                    },
                    row,
                ));
            }
        }
        Ok(rows)
    }

    fn flush(&mut self) -> DbResult<()> {
        self.storage.flush_all_pages()
    }
}

fn meta_path_for(data_path: &Path) -> PathBuf {
    let mut meta = data_path.as_os_str().to_os_string();
    meta.push(".meta.json");
    PathBuf::from(meta)
}
