//! Tests for Directory
//!
//! These tests verify:
//! - Lookup by low-order hash bits
//! - Doubling duplicates every slot
//! - Split re-pointing, with and without doubling
//! - Snapshot restore and invariant checks

use atlaspack::index::{Bucket, Directory, DirectorySnapshot};
use atlaspack::PackError;

use crate::entry;

// =============================================================================
// Helper Functions
// =============================================================================

fn single_bucket() -> Directory {
    Directory::new(Bucket::new(0, 0, 0))
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_new_directory_has_one_slot() {
    let dir = single_bucket();

    assert_eq!(dir.global_depth(), 0);
    assert_eq!(dir.slots(), &[0]);
    assert_eq!(dir.lookup(12345), 0);
    assert_eq!(dir.lookup(-1), 0);
    dir.validate().unwrap();
}

#[test]
fn test_lookup_changes_with_depth() {
    let mut dir = single_bucket();
    dir.split(0, 0b10, 1, 0, &[]).unwrap();

    // Same key, new depth: odd hashes now resolve to the new bucket
    assert_eq!(dir.lookup(0b10), 0);
    assert_eq!(dir.lookup(0b11), 1);
    assert_eq!(dir.position(0b11), 1);
}

// =============================================================================
// Doubling Tests
// =============================================================================

#[test]
fn test_double_duplicates_slots() {
    let mut dir = single_bucket();
    dir.split(0, 0, 1, 0, &[]).unwrap(); // g = 1: [0, 1]
    let before = dir.slots().to_vec();

    dir.double();

    assert_eq!(dir.global_depth(), 2);
    let half = before.len();
    for i in 0..half {
        assert_eq!(dir.slots()[i], before[i]);
        assert_eq!(dir.slots()[i + half], before[i]);
    }
    dir.validate().unwrap();
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_split_at_full_depth_doubles() {
    let mut dir = single_bucket();

    let outcome = dir.split(0, 0b0, 1, 0, &[]).unwrap();

    assert!(outcome.doubled);
    assert_eq!(outcome.local_depth, 1);
    assert_eq!((outcome.pos1, outcome.pos2), (0, 1));
    assert_eq!(dir.global_depth(), 1);
    assert_eq!(dir.slots(), &[0, 1]);
    assert_eq!(dir.bucket(0).unwrap().local_depth, 1);
    assert_eq!(dir.bucket(1).unwrap().local_depth, 1);
    dir.validate().unwrap();
}

#[test]
fn test_split_keeps_triggering_key_in_old_bucket() {
    let mut dir = single_bucket();

    let outcome = dir.split(0, 0b1, 1, 0, &[]).unwrap();

    assert_eq!((outcome.pos1, outcome.pos2), (1, 0));
    assert_eq!(dir.slots(), &[1, 0]);
    assert_eq!(dir.lookup(0b1), 0);
    dir.validate().unwrap();
}

#[test]
fn test_split_below_global_depth_does_not_double() {
    let mut dir = single_bucket();
    dir.double();
    dir.double(); // g = 2, bucket 0 aliased by all four slots

    let outcome = dir.split(0, 0b10, 7, 0, &[]).unwrap();

    assert!(!outcome.doubled);
    assert_eq!(dir.global_depth(), 2);
    assert_eq!(outcome.local_depth, 1);
    // Every alias is re-pointed by its own low bit
    assert_eq!(dir.slots(), &[0, 7, 0, 7]);
    dir.validate().unwrap();
}

#[test]
fn test_split_redistributes_committed_and_pending() {
    let mut dir = Directory::from_snapshot(
        &DirectorySnapshot {
            global_depth: 0,
            buckets: vec![(0, 0)],
            slots: vec![0],
        },
        |_| Ok(4),
    )
    .unwrap();
    let committed = vec![entry(0b00), entry(0b01), entry(0b10), entry(0b11)];
    dir.bucket_mut(0).unwrap().insert(entry(0b101));
    dir.bucket_mut(0).unwrap().insert(entry(0b110));

    let outcome = dir.split(0, 0b100, 1, 0, &committed).unwrap();

    assert_eq!(outcome.moved, 3);
    let old = dir.bucket(0).unwrap();
    let new = dir.bucket(1).unwrap();

    // Committed odd entries are masked out of the old bucket
    assert!(old.pending_deleted.contains(&entry(0b01)));
    assert!(old.pending_deleted.contains(&entry(0b11)));
    assert_eq!(old.pending_deleted.len(), 2);
    // Pending odd entry left the overlay instead of being masked
    assert_eq!(old.pending_new.iter().copied().collect::<Vec<_>>(), vec![entry(0b110)]);
    assert_eq!(old.logical_size(), 3);

    let moved: Vec<_> = new.pending_new.iter().map(|e| e.key_hash).collect();
    assert_eq!(moved, vec![0b01, 0b11, 0b101]);
    assert_eq!(new.logical_size(), 3);
    assert!(old.dirty && new.dirty);
}

#[test]
fn test_split_unknown_bucket_fails() {
    let mut dir = single_bucket();

    let err = dir.split(3, 0, 1, 0, &[]).unwrap_err();

    assert!(matches!(err, PackError::Corruption(_)));
}

#[test]
fn test_split_reusing_existing_id_fails() {
    let mut dir = single_bucket();
    dir.split(0, 0, 1, 0, &[]).unwrap();

    assert!(dir.split(0, 0, 1, 0, &[]).is_err());
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_restores_shape() {
    let mut dir = single_bucket();
    dir.split(0, 0, 1, 0, &[]).unwrap();
    dir.split(0, 0, 2, 0, &[]).unwrap();

    let snapshot = dir.snapshot();
    let restored = Directory::from_snapshot(&snapshot, |_| Ok(0)).unwrap();

    assert_eq!(restored.snapshot(), snapshot);
    assert_eq!(restored.global_depth(), 2);
    assert_eq!(restored.bucket_count(), 3);
}

#[test]
fn test_snapshot_with_misrouted_slot_is_rejected() {
    // Bucket 1 has depth 1 but sits on both an even and an odd slot
    let snapshot = DirectorySnapshot {
        global_depth: 1,
        buckets: vec![(0, 1), (1, 1)],
        slots: vec![1, 1],
    };

    let err = Directory::from_snapshot(&snapshot, |_| Ok(0)).unwrap_err();

    assert!(matches!(err, PackError::Corruption(_)));
}

#[test]
fn test_snapshot_with_wrong_slot_count_is_rejected() {
    let snapshot = DirectorySnapshot {
        global_depth: 2,
        buckets: vec![(0, 0)],
        slots: vec![0, 0],
    };

    assert!(Directory::from_snapshot(&snapshot, |_| Ok(0)).is_err());
}
