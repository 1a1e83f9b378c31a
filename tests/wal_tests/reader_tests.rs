//! Tests for WalReader

use atlaspack::index::ENTRY_SIZE;
use atlaspack::storage::MemoryStore;
use atlaspack::wal::WalReader;

use crate::{wal_path, write_wal};

#[test]
fn test_read_in_append_order() {
    let store = MemoryStore::new();
    let path = wal_path();
    let written = write_wal(&store, &path, 20);

    let read: Vec<_> = WalReader::open(&store, &path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(read, written);
}

#[test]
fn test_empty_wal() {
    let store = MemoryStore::new();
    let path = wal_path();
    store.put_contents(&path, Vec::new());

    let mut reader = WalReader::open(&store, &path).unwrap();

    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.torn_tail(), 0);
}

#[test]
fn test_stops_at_torn_tail() {
    let store = MemoryStore::new();
    let path = wal_path();
    write_wal(&store, &path, 2);
    let mut bytes = store.contents(&path).unwrap();
    bytes.extend_from_slice(&[0xAB; 10]);
    store.put_contents(&path, bytes);

    let mut reader = WalReader::open(&store, &path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.torn_tail(), 10);

    // Stays finished
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_iterator_reports_torn_tail() {
    let store = MemoryStore::new();
    let path = wal_path();
    write_wal(&store, &path, 1);
    let mut bytes = store.contents(&path).unwrap();
    bytes.resize(ENTRY_SIZE + 5, 1);
    store.put_contents(&path, bytes);

    let mut iter = WalReader::open(&store, &path).unwrap().entries();
    assert_eq!(iter.by_ref().count(), 1);
    assert_eq!(iter.torn_tail(), 5);
}

#[test]
fn test_open_missing_file_fails() {
    let store = MemoryStore::new();

    assert!(WalReader::open(&store, &wal_path()).is_err());
}
