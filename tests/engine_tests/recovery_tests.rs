//! Engine tests: crash recovery through WAL replay

use atlaspack::index::read_entries;
use atlaspack::layout::Layout;
use atlaspack::storage::{MemoryStore, Store};
use atlaspack::wal::RecoveryResult;

use crate::{
    all_entries, key_with_low_bit, memory_config, noise, open_failing, open_memory, FailingStore,
    ROOT,
};

#[test]
fn test_crash_replays_wal() {
    let store = MemoryStore::new();
    let engine = open_memory(&store, memory_config(4));
    for i in 0..30 {
        engine.put(&format!("f{}", i), &noise(i, 64)).unwrap();
    }
    let before = all_entries(&engine);

    // No close: bucket files never saw these entries
    drop(engine);
    store.simulate_crash();

    let engine = open_memory(&store, memory_config(4));

    assert_eq!(
        engine.recovery(),
        Some(&RecoveryResult {
            entries_recovered: 30,
            was_truncated: false,
            torn_bytes: 0,
        })
    );
    assert!(!store.exists(&Layout::new(ROOT).wal_path()).unwrap());
    assert_eq!(all_entries(&engine), before);
    engine.validate().unwrap();
    for i in 0..30 {
        assert_eq!(engine.get(&format!("f{}", i)).unwrap(), Some(noise(i, 64)));
    }
}

#[test]
fn test_torn_wal_tail_ignored() {
    let store = MemoryStore::new();
    let wal = Layout::new(ROOT).wal_path();
    let engine = open_memory(&store, memory_config(8));
    for i in 0..10 {
        engine.put(&format!("f{}", i), b"data").unwrap();
    }
    drop(engine);

    let mut bytes = store.contents(&wal).unwrap();
    bytes.extend_from_slice(&[0xFF; 5]);
    store.put_contents(&wal, bytes);

    let engine = open_memory(&store, memory_config(8));
    let recovery = engine.recovery().unwrap();

    assert_eq!(recovery.entries_recovered, 10);
    assert!(recovery.was_truncated);
    assert_eq!(recovery.torn_bytes, 5);
    assert_eq!(all_entries(&engine).len(), 10);
}

#[test]
fn test_replaying_same_wal_twice_is_idempotent() {
    let store = MemoryStore::new();
    let layout = Layout::new(ROOT);
    let engine = open_memory(&store, memory_config(4));
    for i in 0..20 {
        engine.put(&format!("f{}", i), b"payload").unwrap();
    }
    drop(engine);
    let saved_wal = store.contents(&layout.wal_path()).unwrap();

    let engine = open_memory(&store, memory_config(4));
    let first = all_entries(&engine);
    drop(engine);

    // As if the crash hit after the bucket rewrites but before the WAL delete
    store.put_contents(&layout.wal_path(), saved_wal);
    let engine = open_memory(&store, memory_config(4));

    assert_eq!(engine.recovery().unwrap().entries_recovered, 20);
    assert_eq!(all_entries(&engine), first);
    engine.validate().unwrap();

    let mut on_disk = 0;
    for bucket in engine.stats().unwrap().buckets {
        let raw = store.contents(&layout.bucket_path(bucket.id)).unwrap();
        on_disk += read_entries(&mut &raw[..]).unwrap().0.len();
    }
    assert_eq!(on_disk, 20);
    for i in 0..20 {
        assert_eq!(engine.get(&format!("f{}", i)).unwrap(), Some(b"payload".to_vec()));
    }
}

#[test]
fn test_no_wal_after_clean_close() {
    let store = MemoryStore::new();
    let engine = open_memory(&store, memory_config(4));
    engine.put("a", b"1").unwrap();
    engine.close().unwrap();

    let engine = open_memory(&store, memory_config(4));

    assert!(engine.recovery().is_none());
    assert_eq!(engine.get("a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_puts_after_recovery_start_new_wal() {
    let store = MemoryStore::new();
    let wal = Layout::new(ROOT).wal_path();
    let engine = open_memory(&store, memory_config(4));
    engine.put("before", b"1").unwrap();
    drop(engine);

    let engine = open_memory(&store, memory_config(4));
    assert!(!store.exists(&wal).unwrap());
    engine.put("after", b"2").unwrap();

    assert_eq!(store.len(&wal).unwrap(), atlaspack::index::ENTRY_SIZE as u64);
    assert_eq!(engine.get("before").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get("after").unwrap(), Some(b"2".to_vec()));
}

// =============================================================================
// Interrupted Consolidation Tests
// =============================================================================

/// Store with `low` (bit 0 = 0) and `high` (bit 0 = 1) committed in index-0
fn committed_pair(store: &MemoryStore) -> (String, String) {
    let low = key_with_low_bit("low-", 0);
    let high = key_with_low_bit("high-", 1);
    let engine = open_memory(store, memory_config(2));
    engine.put(&low, b"low").unwrap();
    engine.put(&high, b"high").unwrap();
    engine.close().unwrap();
    (low, high)
}

#[test]
fn test_crash_while_publishing_keeps_moved_entry() {
    let store = MemoryStore::new();
    let layout = Layout::new(ROOT);
    let (low, high) = committed_pair(&store);

    let failing = FailingStore {
        inner: store.clone(),
        fail_create: None,
        fail_rename_to: Some("index-1"),
    };
    let engine = open_failing(failing, memory_config(2));
    // Splits bucket 0 and moves the committed `low` entry to bucket 1
    let late = key_with_low_bit("late-", 1);
    engine.put(&late, b"late").unwrap();
    assert_eq!(engine.stats().unwrap().global_depth, 1);

    assert!(engine.close().is_err());
    store.simulate_crash();

    let engine = open_memory(&store, memory_config(2));

    assert!(!store.exists(&Layout::rewrite_path(&layout.bucket_path(1))).unwrap());
    assert_eq!(engine.stats().unwrap().global_depth, 1);
    assert_eq!(engine.get(&low).unwrap(), Some(b"low".to_vec()));
    assert_eq!(engine.get(&high).unwrap(), Some(b"high".to_vec()));
    assert_eq!(engine.get(&late).unwrap(), Some(b"late".to_vec()));
    engine.validate().unwrap();
}

#[test]
fn test_failed_staging_rolls_back_to_wal() {
    let store = MemoryStore::new();
    let layout = Layout::new(ROOT);
    let (low, high) = committed_pair(&store);

    let failing = FailingStore {
        inner: store.clone(),
        fail_create: Some("index-1.rewrite"),
        fail_rename_to: None,
    };
    let engine = open_failing(failing, memory_config(2));
    let late = key_with_low_bit("late-", 1);
    engine.put(&late, b"late").unwrap();

    assert!(engine.close().is_err());
    // Nothing staged survives the failure
    assert!(!store.exists(&Layout::rewrite_path(&layout.bucket_path(0))).unwrap());
    assert!(!store.exists(&Layout::rewrite_path(&layout.metadata_path())).unwrap());
    store.simulate_crash();

    let engine = open_memory(&store, memory_config(2));

    assert_eq!(engine.recovery().unwrap().entries_recovered, 1);
    assert_eq!(engine.get(&low).unwrap(), Some(b"low".to_vec()));
    assert_eq!(engine.get(&high).unwrap(), Some(b"high".to_vec()));
    assert_eq!(engine.get(&late).unwrap(), Some(b"late".to_vec()));
    engine.validate().unwrap();
}

#[test]
fn test_uncommitted_staged_files_discarded_on_open() {
    let store = MemoryStore::new();
    let layout = Layout::new(ROOT);
    let (low, high) = committed_pair(&store);
    let bucket0 = store.contents(&layout.bucket_path(0)).unwrap();

    // A crash after staging but before the metadata rename
    store.put_contents(&Layout::rewrite_path(&layout.metadata_path()), vec![1, 2, 3]);
    store.put_contents(&Layout::rewrite_path(&layout.bucket_path(0)), Vec::new());
    store.put_contents(&Layout::rewrite_path(&layout.bucket_path(7)), Vec::new());

    let engine = open_memory(&store, memory_config(2));

    assert_eq!(store.contents(&layout.bucket_path(0)).unwrap(), bucket0);
    assert!(store
        .files()
        .iter()
        .all(|p| !p.to_string_lossy().ends_with(".rewrite")));
    assert_eq!(engine.get(&low).unwrap(), Some(b"low".to_vec()));
    assert_eq!(engine.get(&high).unwrap(), Some(b"high".to_vec()));
}
