//! Bucket overlay
//!
//! A bucket is a sorted durable file plus two in-memory sets. Entries only
//! reach the file at consolidation; until then `pending_new` holds what was
//! added and `pending_deleted` holds committed entries that moved to another
//! bucket during a split.

use std::collections::BTreeSet;

use super::IndexEntry;

/// Small integer id; the bucket file is `index-<id>`
pub type BucketId = i32;

#[derive(Debug, Clone)]
pub struct Bucket {
    pub id: BucketId,
    /// Low-order hash bits shared by every entry of this bucket
    pub local_depth: u32,
    /// Number of entries in the durable file
    pub committed_len: usize,
    pub pending_new: BTreeSet<IndexEntry>,
    /// Always a subset of the committed entries
    pub pending_deleted: BTreeSet<IndexEntry>,
    pub dirty: bool,
}

impl Bucket {
    pub fn new(id: BucketId, local_depth: u32, committed_len: usize) -> Self {
        Self {
            id,
            local_depth,
            committed_len,
            pending_new: BTreeSet::new(),
            pending_deleted: BTreeSet::new(),
            dirty: false,
        }
    }

    pub fn insert(&mut self, entry: IndexEntry) {
        self.pending_new.insert(entry);
        self.dirty = true;
    }

    /// committed + pending_new - pending_deleted
    pub fn logical_size(&self) -> usize {
        (self.committed_len + self.pending_new.len()).saturating_sub(self.pending_deleted.len())
    }

    pub fn is_overflowing(&self, capacity: usize) -> bool {
        self.logical_size() > capacity
    }

    /// Live entries given the committed file contents, sorted
    pub fn merge(&self, committed: &[IndexEntry]) -> Vec<IndexEntry> {
        let mut live: BTreeSet<IndexEntry> = committed
            .iter()
            .filter(|e| !self.pending_deleted.contains(e))
            .copied()
            .collect();
        live.extend(self.pending_new.iter().copied());
        live.into_iter().collect()
    }

    /// Reset the overlay after the file was rewritten with `len` entries
    pub fn mark_consolidated(&mut self, len: usize) {
        self.committed_len = len;
        self.pending_new.clear();
        self.pending_deleted.clear();
        self.dirty = false;
    }
}
