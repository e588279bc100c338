use tempfile::tempdir;
use types::Value;

use crate::{BufferPool, HeapFile, HeapTable, StorageManager};
use common::Row;

#[test]
fn buffer_pool_miss_then_hit_updates_stats() {
    let mut pool = BufferPool::new(2);
    assert!(pool.get(1).is_none());
    pool.put(1, vec![1, 2, 3], false);
    assert_eq!(pool.get(1), Some(vec![1, 2, 3]));

    let stats = pool.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn buffer_pool_evicts_lru_when_full() {
    let mut pool = BufferPool::new(2);
    pool.put(1, vec![1], true);
    pool.put(2, vec![2], false);
    // touch 1 so 2 becomes LRU
    pool.get(1);
    let evicted = pool.put(3, vec![3], false);

    let evicted = evicted.expect("pool at capacity must evict on a new key");
    assert_eq!(evicted.page_id, 2);
    assert!(!evicted.dirty);
}

#[test]
fn buffer_pool_eviction_reports_dirty_flag() {
    let mut pool = BufferPool::new(1);
    pool.put(1, vec![1], true);
    let evicted = pool.put(2, vec![2], false).unwrap();
    assert_eq!(evicted.page_id, 1);
    assert!(evicted.dirty, "dirty flag must survive to eviction");
}

#[test]
fn buffer_pool_put_false_does_not_clear_existing_dirty_flag() {
    let mut pool = BufferPool::new(2);
    pool.put(1, vec![1], true);
    pool.put(1, vec![1, 1], false);
    assert!(pool.is_dirty(1));
}

#[test]
fn buffer_pool_mark_and_clear_dirty() {
    let mut pool = BufferPool::new(2);
    pool.put(1, vec![1], false);
    assert!(!pool.is_dirty(1));
    pool.mark_dirty(1);
    assert!(pool.is_dirty(1));
    pool.clear_dirty(1);
    assert!(!pool.is_dirty(1));
}

#[test]
fn buffer_pool_flush_all_returns_and_clears_dirty_entries() {
    let mut pool = BufferPool::new(4);
    pool.put(1, vec![1], true);
    pool.put(2, vec![2], false);
    pool.put(3, vec![3], true);

    let mut flushed = pool.flush_all();
    flushed.sort_by_key(|(id, _)| *id);
    assert_eq!(flushed, vec![(1, vec![1]), (3, vec![3])]);

    assert!(!pool.is_dirty(1));
    assert!(!pool.is_dirty(3));
    assert!(pool.flush_all().is_empty());
}

#[test]
fn buffer_pool_remove_returns_entry_without_flush_semantics() {
    let mut pool = BufferPool::new(4);
    pool.put(1, vec![9], true);
    let entry = pool.remove(1).unwrap();
    assert_eq!(entry.data, vec![9]);
    assert!(entry.dirty);
    assert!(!pool.contains(1));
}

#[test]
fn buffer_pool_clear_drops_everything() {
    let mut pool = BufferPool::new(4);
    pool.put(1, vec![1], true);
    pool.put(2, vec![2], true);
    pool.clear();
    assert_eq!(pool.len(), 0);
}

#[test]
fn storage_manager_read_page_caches_disk_fallthrough() {
    let dir = tempdir().unwrap();
    let mut sm = StorageManager::open(
        dir.path().join("data.bin"),
        dir.path().join("meta.json"),
        4,
    )
    .unwrap();

    let page_id = sm.allocate_page().unwrap();
    let first = sm.read_page(page_id).unwrap();
    let second = sm.read_page(page_id).unwrap();
    assert_eq!(first, second);
    assert_eq!(sm.buffer_stats().hits, 1);
}

#[test]
fn storage_manager_write_page_does_not_touch_disk_until_flush() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("data.bin");
    let mut sm = StorageManager::open(&data_path, dir.path().join("meta.json"), 4).unwrap();

    let page_id = sm.allocate_page().unwrap();
    let mut payload = vec![0u8; storage::PAGE_SIZE];
    payload[0] = 42;
    sm.write_page(page_id, payload.clone()).unwrap();

    let cached = sm.read_page(page_id).unwrap();
    assert_eq!(cached, payload);

    sm.flush_page(page_id).unwrap();
    drop(sm);

    let mut reopened = StorageManager::open(&data_path, dir.path().join("meta.json"), 4).unwrap();
    let from_disk = reopened.read_page(page_id).unwrap();
    assert_eq!(from_disk, payload);
}

#[test]
fn storage_manager_deallocate_flushes_dirty_page_first() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("data.bin");
    let mut sm = StorageManager::open(&data_path, dir.path().join("meta.json"), 4).unwrap();

    let page_id = sm.allocate_page().unwrap();
    let mut payload = vec![0u8; storage::PAGE_SIZE];
    payload[0] = 7;
    sm.write_page(page_id, payload.clone()).unwrap();
    sm.deallocate_page(page_id).unwrap();

    assert_eq!(sm.allocated_pages().len(), 0);
}

#[test]
fn storage_manager_shutdown_is_idempotent_and_flushes() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("data.bin");
    let mut sm = StorageManager::open(&data_path, dir.path().join("meta.json"), 4).unwrap();

    let page_id = sm.allocate_page().unwrap();
    sm.write_page(page_id, vec![1u8; storage::PAGE_SIZE])
        .unwrap();
    sm.shutdown().unwrap();
    sm.shutdown().unwrap();

    assert!(
        sm.read_page(page_id).is_err(),
        "ops must fail after shutdown"
    );
}

#[test]
fn heap_file_insert_and_get_round_trip() {
    let dir = tempdir().unwrap();
    let mut table = HeapFile::open(dir.path().join("heap.tbl"), 1).unwrap();

    let row = Row::new(vec![
        Value::Int(1),
        Value::Text("Will".into()),
        Value::Int(27),
    ]);
    let rid = table.insert(&row).unwrap();
    let fetched = table.get(rid).unwrap();

    assert_eq!(fetched.values, row.values);
}

#[test]
fn heap_file_delete_marks_slot_empty() {
    let dir = tempdir().unwrap();
    let mut table = HeapFile::open(dir.path().join("heap.tbl"), 1).unwrap();

    let row = Row::new(vec![Value::Int(1)]);
    let rid = table.insert(&row).unwrap();
    table.delete(rid).unwrap();

    assert!(table.get(rid).is_err());
}

#[test]
fn heap_file_delete_twice_returns_error() {
    let dir = tempdir().unwrap();
    let mut table = HeapFile::open(dir.path().join("heap.tbl"), 1).unwrap();

    let row = Row::new(vec![Value::Int(7)]);
    let rid = table.insert(&row).unwrap();
    table.delete(rid).unwrap();
    assert!(table.delete(rid).is_err());
}

#[test]
fn heap_file_large_rows_allocate_new_pages() {
    let dir = tempdir().unwrap();
    let mut table = HeapFile::open(dir.path().join("heap.tbl"), 1).unwrap();

    let big_payload = "x".repeat(storage::PAGE_SIZE - 256);
    let row = Row::new(vec![Value::Text(big_payload.clone())]);

    let rid_a = table.insert(&row).unwrap();
    let rid_b = table.insert(&row).unwrap();

    assert!(rid_b.page_id.0 > rid_a.page_id.0);

    let fetched = table.get(rid_b).unwrap();
    assert_eq!(fetched.values, vec![Value::Text(big_payload)]);
}

#[test]
fn heap_file_update_relocates_row() {
    let dir = tempdir().unwrap();
    let mut table = HeapFile::open(dir.path().join("heap.tbl"), 1).unwrap();

    let row = Row::new(vec![Value::Int(1)]);
    let rid = table.insert(&row).unwrap();

    let updated = Row::new(vec![Value::Int(2)]);
    let new_rid = table.update(rid, &updated).unwrap();

    assert!(table.get(rid).is_err(), "old slot must be tombstoned");
    assert_eq!(table.get(new_rid).unwrap().values, updated.values);
}

#[test]
fn heap_file_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heap.tbl");
    let row = Row::new(vec![Value::Int(99)]);

    let rid = {
        let mut table = HeapFile::open(&path, 1).unwrap();
        let rid = table.insert(&row).unwrap();
        table.flush().unwrap();
        rid
    };

    let mut reopened = HeapFile::open(&path, 1).unwrap();
    assert_eq!(reopened.get(rid).unwrap().values, row.values);
}
