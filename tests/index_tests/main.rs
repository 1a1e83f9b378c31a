//! Tests for the extendible-hash index
//!
//! These tests verify:
//! - Entry encoding
//! - Directory lookup, doubling and invariants
//! - Bucket splits and redistribution
//! - Overflow policies and consolidation
//! - Split correctness on arbitrary hash sets (proptest)

mod directory_tests;

use std::collections::BTreeMap;

use atlaspack::index::{self, BucketId, BucketStorage, ConsolidationReport, Directory, IndexEntry};
use atlaspack::Result;

// =============================================================================
// Shared Helpers
// =============================================================================

/// Bucket files kept in a map
#[derive(Debug, Default)]
pub struct MemBuckets {
    pub files: BTreeMap<BucketId, Vec<IndexEntry>>,
    pub staged: BTreeMap<BucketId, Vec<IndexEntry>>,
    pub last_bucket_id: BucketId,
    pub reads: usize,
}

impl MemBuckets {
    pub fn new() -> Self {
        let mut files = BTreeMap::new();
        files.insert(0, Vec::new());
        Self {
            files,
            staged: BTreeMap::new(),
            last_bucket_id: 0,
            reads: 0,
        }
    }
}

impl BucketStorage for MemBuckets {
    fn read_committed(&mut self, id: BucketId) -> Result<Vec<IndexEntry>> {
        self.reads += 1;
        Ok(self.files.get(&id).cloned().unwrap_or_default())
    }

    fn allocate(&mut self) -> Result<(BucketId, usize)> {
        self.last_bucket_id += 1;
        let len = self.files.entry(self.last_bucket_id).or_default().len();
        Ok((self.last_bucket_id, len))
    }

    fn stage(&mut self, id: BucketId, entries: &[IndexEntry]) -> Result<()> {
        self.staged.insert(id, entries.to_vec());
        Ok(())
    }

    fn publish(&mut self, id: BucketId) -> Result<()> {
        let entries = self
            .staged
            .remove(&id)
            .ok_or_else(|| atlaspack::PackError::InvalidInput(format!("bucket {} not staged", id)))?;
        self.files.insert(id, entries);
        Ok(())
    }
}

/// Stage and publish every dirty bucket
pub fn flush(dir: &mut Directory, files: &mut MemBuckets) -> ConsolidationReport {
    let report = index::consolidate(dir, files).unwrap();
    index::publish(dir, files, &report).unwrap();
    report
}

/// Entry with a chosen hash; part/offset derived from the hash
pub fn entry(hash: i64) -> IndexEntry {
    IndexEntry::new(hash, 0, hash.wrapping_mul(31), 16)
}
