//! Engine tests: part file rollover and metadata

use atlaspack::layout::Layout;
use atlaspack::metadata::Metadata;
use atlaspack::storage::{MemoryStore, Store};
use atlaspack::Config;

use crate::{noise, open_memory, ROOT};

const PART_MAX: u64 = 1000;

fn rollover_config(capacity: i32) -> Config {
    Config::builder()
        .data_dir(ROOT)
        .bucket_capacity(capacity)
        .part_max_size(PART_MAX)
        .build()
}

#[test]
fn test_rollover_once_per_crossing() {
    let store = MemoryStore::new();
    let layout = Layout::new(ROOT);
    let engine = open_memory(&store, rollover_config(1024));

    let mut part = 0;
    for i in 0..20 {
        engine.put(&format!("f{}", i), &noise(i, 300)).unwrap();
        let stats = engine.stats().unwrap();

        assert!(stats.current_part_id == part || stats.current_part_id == part + 1);
        if stats.current_part_id != part {
            assert_eq!(stats.current_part_position, 0);
        }
        assert!(stats.current_part_position < PART_MAX);
        part = stats.current_part_id;
    }

    assert!(part >= 4);
    for id in 0..part {
        assert!(store.len(&layout.part_path(id)).unwrap() >= PART_MAX);
    }
    assert!(store.len(&layout.part_path(part)).unwrap() < PART_MAX);
    assert!(!store.exists(&layout.part_path(part + 1)).unwrap());
}

#[test]
fn test_reads_span_parts() {
    let store = MemoryStore::new();
    let engine = open_memory(&store, rollover_config(4));
    for i in 0..20 {
        engine.put(&format!("f{}", i), &noise(i, 300)).unwrap();
    }

    for i in 0..20 {
        assert_eq!(engine.get(&format!("f{}", i)).unwrap(), Some(noise(i, 300)));
    }

    drop(engine);
    let engine = open_memory(&store, rollover_config(4));
    for i in 0..20 {
        assert_eq!(engine.get(&format!("f{}", i)).unwrap(), Some(noise(i, 300)));
    }
}

#[test]
fn test_metadata_tracks_part_and_consolidated_directory() {
    let store = MemoryStore::new();
    let layout = Layout::new(ROOT);
    let engine = open_memory(&store, rollover_config(2));
    for i in 0..12 {
        engine.put(&format!("f{}", i), &noise(i, 300)).unwrap();
    }
    let stats = engine.stats().unwrap();
    assert!(stats.global_depth > 0);

    let meta = Metadata::load(&store, &layout).unwrap().unwrap();
    assert_eq!(meta.used_part_position, stats.current_part_id);
    assert_eq!(meta.current_part_name, format!("part-{}", stats.current_part_id));
    assert_eq!(meta.bucket_capacity, 2);
    // Splits are not in the bucket files yet
    assert_eq!(meta.directory.global_depth, 0);
    assert_eq!(meta.directory.slots, vec![0]);
    assert_eq!(meta.last_bucket_id, 0);

    engine.close().unwrap();

    let meta = Metadata::load(&store, &layout).unwrap().unwrap();
    assert_eq!(meta.directory.global_depth, stats.global_depth);
    assert_eq!(meta.directory.slots, stats.slots);
    assert_eq!(meta.last_bucket_id, stats.last_bucket_id);
}

#[test]
fn test_reopen_continues_current_part() {
    let store = MemoryStore::new();
    let engine = open_memory(&store, rollover_config(1024));
    for i in 0..4 {
        engine.put(&format!("f{}", i), &noise(i, 300)).unwrap();
    }
    let before = engine.stats().unwrap();
    engine.close().unwrap();

    let engine = open_memory(&store, rollover_config(1024));
    let after = engine.stats().unwrap();

    assert_eq!(after.current_part_id, before.current_part_id);
    assert_eq!(after.current_part_position, before.current_part_position);
}
