//! Extendible-hash directory
//!
//! `2^global_depth` slots, each naming a bucket by id. A bucket with local
//! depth `d` is referenced by every slot whose low `d` bits match its own,
//! so it has `2^(global_depth - d)` aliases.
//!
//! ## Split
//! ```text
//!  g = 1, bucket A has d = 0        split A on k where k & 1 == 0
//!  slot 0 ─┐                        slot 0 ── A (d = 1)
//!  slot 1 ─┴─ A                     slot 1 ── B (d = 1)
//! ```
//! Doubling happens only when the splitting bucket already uses every
//! directory bit. The split bit is the bucket's old local depth; slots and
//! entries on the side of that bit opposite to `k` move to the new bucket.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PackError, Result};
use crate::hash::{low_bits_mask, position_in_directory, KeyHash};

use super::{Bucket, BucketId, IndexEntry};

/// Persistable shape of a directory (no overlays)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub global_depth: u32,
    /// `(id, local_depth)` for every bucket, ordered by id
    pub buckets: Vec<(BucketId, u32)>,
    pub slots: Vec<BucketId>,
}

/// What a split did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub split_bucket: BucketId,
    pub new_bucket: BucketId,
    /// Slot of the triggering key, kept by the split bucket
    pub pos1: usize,
    /// `pos1` with the split bit flipped, now owned by the new bucket
    pub pos2: usize,
    pub local_depth: u32,
    pub doubled: bool,
    /// Entries handed to the new bucket
    pub moved: usize,
}

#[derive(Debug, Clone)]
pub struct Directory {
    global_depth: u32,
    slots: Vec<BucketId>,
    buckets: BTreeMap<BucketId, Bucket>,
}

impl Directory {
    /// Depth-0 directory with a single bucket
    pub fn new(mut root: Bucket) -> Self {
        root.local_depth = 0;
        let slots = vec![root.id];
        let mut buckets = BTreeMap::new();
        buckets.insert(root.id, root);
        Self {
            global_depth: 0,
            slots,
            buckets,
        }
    }

    /// Rebuild from persisted state; `committed_len` reports each bucket
    /// file's entry count.
    pub fn from_snapshot(
        snapshot: &DirectorySnapshot,
        mut committed_len: impl FnMut(BucketId) -> Result<usize>,
    ) -> Result<Self> {
        let mut buckets = BTreeMap::new();
        for &(id, local_depth) in &snapshot.buckets {
            let len = committed_len(id)?;
            if buckets.insert(id, Bucket::new(id, local_depth, len)).is_some() {
                return Err(PackError::Corruption(format!("bucket {} listed twice", id)));
            }
        }

        let directory = Self {
            global_depth: snapshot.global_depth,
            slots: snapshot.slots.clone(),
            buckets,
        };
        directory.validate()?;
        Ok(directory)
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            global_depth: self.global_depth,
            buckets: self
                .buckets
                .values()
                .map(|b| (b.id, b.local_depth))
                .collect(),
            slots: self.slots.clone(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn slots(&self) -> &[BucketId] {
        &self.slots
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    pub fn bucket(&self, id: BucketId) -> Result<&Bucket> {
        self.buckets
            .get(&id)
            .ok_or_else(|| PackError::Corruption(format!("directory names unknown bucket {}", id)))
    }

    pub fn bucket_mut(&mut self, id: BucketId) -> Result<&mut Bucket> {
        self.buckets
            .get_mut(&id)
            .ok_or_else(|| PackError::Corruption(format!("directory names unknown bucket {}", id)))
    }

    /// Ids of buckets with unconsolidated changes
    pub fn dirty_buckets(&self) -> Vec<BucketId> {
        self.buckets
            .values()
            .filter(|b| b.dirty)
            .map(|b| b.id)
            .collect()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn position(&self, hash: KeyHash) -> usize {
        position_in_directory(hash, self.global_depth)
    }

    /// Bucket responsible for `hash` under the current global depth
    pub fn lookup(&self, hash: KeyHash) -> BucketId {
        self.slots[self.position(hash)]
    }

    // =========================================================================
    // Growth
    // =========================================================================

    /// Double the slot array; slot `i + 2^g` aliases slot `i`
    pub fn double(&mut self) {
        self.slots.extend_from_within(..);
        self.global_depth += 1;
    }

    /// Whether `id` can split without pushing the directory past `max_depth`
    pub fn can_split(&self, id: BucketId, max_depth: u32) -> Result<bool> {
        let local = self.bucket(id)?.local_depth;
        Ok(local < self.global_depth || self.global_depth < max_depth.min(63))
    }

    /// Split bucket `id` after an overflow caused by `key_hash`
    ///
    /// `committed` is the bucket's durable file content. The new bucket gets
    /// `new_id` and starts with `new_committed_len` durable entries (zero
    /// unless a file with that id survived an interrupted consolidation).
    /// Neither bucket file is touched; both buckets become dirty.
    pub fn split(
        &mut self,
        id: BucketId,
        key_hash: KeyHash,
        new_id: BucketId,
        new_committed_len: usize,
        committed: &[IndexEntry],
    ) -> Result<SplitOutcome> {
        if self.buckets.contains_key(&new_id) {
            return Err(PackError::Corruption(format!("bucket {} already exists", new_id)));
        }

        let old_local = self.bucket(id)?.local_depth;
        let doubled = old_local == self.global_depth;
        if doubled {
            self.double();
        }

        let new_local = old_local + 1;
        let bit = 1u64 << old_local;
        let key_side = key_hash as u64 & bit;

        // Aliases on the far side of the split bit go to the new bucket
        for (slot, target) in self.slots.iter_mut().enumerate() {
            if *target == id && (slot as u64 & bit) != key_side {
                *target = new_id;
            }
        }

        let pos1 = self.position(key_hash);
        let pos2 = pos1 ^ bit as usize;

        let mut new_bucket = Bucket::new(new_id, new_local, new_committed_len);
        let bucket = self.bucket_mut(id)?;
        bucket.local_depth = new_local;

        let committed_set: BTreeSet<IndexEntry> = committed.iter().copied().collect();
        let moving: Vec<IndexEntry> = bucket
            .merge(committed)
            .into_iter()
            .filter(|e| (e.key_hash as u64 & bit) != key_side)
            .collect();

        for entry in &moving {
            new_bucket.pending_new.insert(*entry);
            bucket.pending_new.remove(entry);
            if committed_set.contains(entry) {
                bucket.pending_deleted.insert(*entry);
            }
        }

        bucket.dirty = true;
        new_bucket.dirty = true;
        self.buckets.insert(new_id, new_bucket);

        Ok(SplitOutcome {
            split_bucket: id,
            new_bucket: new_id,
            pos1,
            pos2,
            local_depth: new_local,
            doubled,
            moved: moving.len(),
        })
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    /// Check the slot/bucket invariants
    ///
    /// - slot count is `2^global_depth`
    /// - every slot names a known bucket with `local_depth <= global_depth`
    /// - every slot of a bucket agrees with it on the low `local_depth` bits
    /// - a bucket of depth `d` is referenced by exactly `2^(g - d)` slots
    pub fn validate(&self) -> Result<()> {
        if self.global_depth > 63 || self.slots.len() != 1usize << self.global_depth {
            return Err(PackError::Corruption(format!(
                "directory has {} slots at global depth {}",
                self.slots.len(),
                self.global_depth
            )));
        }

        let mut patterns: BTreeMap<BucketId, (u64, usize)> = BTreeMap::new();
        for (slot, id) in self.slots.iter().enumerate() {
            let bucket = self.bucket(*id)?;
            if bucket.local_depth > self.global_depth {
                return Err(PackError::Corruption(format!(
                    "bucket {} has local depth {} above global depth {}",
                    id, bucket.local_depth, self.global_depth
                )));
            }
            let pattern = slot as u64 & low_bits_mask(bucket.local_depth);
            let seen = patterns.entry(*id).or_insert((pattern, 0));
            if seen.0 != pattern {
                return Err(PackError::Corruption(format!(
                    "slot {} disagrees with bucket {} on its low {} bits",
                    slot, id, bucket.local_depth
                )));
            }
            seen.1 += 1;
        }

        for (id, (_, count)) in patterns {
            let expected = 1usize << (self.global_depth - self.bucket(id)?.local_depth);
            if count != expected {
                return Err(PackError::Corruption(format!(
                    "bucket {} referenced by {} slots, expected {}",
                    id, count, expected
                )));
            }
        }
        Ok(())
    }
}
