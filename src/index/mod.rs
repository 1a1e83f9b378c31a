//! Index Module
//!
//! On-disk extendible-hash index over stored files.
//!
//! ## Responsibilities
//! - Route a key hash to its bucket through the directory
//! - Split overflowing buckets (doubling the directory when needed)
//! - Consolidate bucket overlays into sorted bucket files (stage, then publish)
//!
//! ## Bucket File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Entry (24 bytes, big-endian), sorted by key hash         │
//! │ ┌─────────────┬────────────┬────────────┬──────────────┐ │
//! │ │ KeyHash (8) │ PartId (4) │ Offset (8) │ Size (4)     │ │
//! │ └─────────────┴────────────┴────────────┴──────────────┘ │
//! │ ... repeated ...                                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Normal inserts and WAL replay both go through [`apply_entry`], so a
//! replayed WAL rebuilds exactly the overlays and splits it recorded.

mod bucket;
mod directory;
mod entry;
mod files;

pub use bucket::{Bucket, BucketId};
pub use directory::{Directory, DirectorySnapshot, SplitOutcome};
pub use entry::{read_entries, IndexEntry, ENTRY_SIZE};
pub use files::{committed_len, BucketFiles};

use crate::config::SplitPolicy;
use crate::error::Result;

/// Durable side of the buckets, as seen by the index algorithms
pub trait BucketStorage {
    /// Entries currently in the bucket's file, in file order
    fn read_committed(&mut self, id: BucketId) -> Result<Vec<IndexEntry>>;

    /// Reserve the next bucket id and make sure its file exists.
    /// Returns the id and the number of entries already in that file.
    fn allocate(&mut self) -> Result<(BucketId, usize)>;

    /// Durably write `entries` as the bucket's next file, beside the current one
    fn stage(&mut self, id: BucketId, entries: &[IndexEntry]) -> Result<()>;

    /// Atomically replace the bucket's file with its staged one
    fn publish(&mut self, id: BucketId) -> Result<()>;
}

/// Overflow handling knobs
#[derive(Debug, Clone, Copy)]
pub struct SplitSettings {
    pub capacity: usize,
    pub policy: SplitPolicy,
    pub max_global_depth: u32,
}

/// Result of applying one entry
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// Bucket holding the entry afterwards
    pub bucket: BucketId,
    pub splits: Vec<SplitOutcome>,
}

/// Insert `entry` into its bucket's overlay and split on overflow
///
/// With `SplitPolicy::Once` a single split runs per overflowing insert even
/// if the bucket is still over capacity afterwards.
pub fn apply_entry(
    directory: &mut Directory,
    entry: IndexEntry,
    settings: &SplitSettings,
    storage: &mut impl BucketStorage,
) -> Result<ApplyOutcome> {
    let target = directory.lookup(entry.key_hash);
    directory.bucket_mut(target)?.insert(entry);

    let mut splits = Vec::new();
    loop {
        let target = directory.lookup(entry.key_hash);
        if !directory.bucket(target)?.is_overflowing(settings.capacity) {
            break;
        }
        if !directory.can_split(target, settings.max_global_depth)? {
            tracing::warn!(
                bucket = target,
                global_depth = directory.global_depth(),
                "bucket over capacity but directory is at its depth limit"
            );
            break;
        }

        let committed = storage.read_committed(target)?;
        let (new_id, new_len) = storage.allocate()?;
        let outcome = directory.split(target, entry.key_hash, new_id, new_len, &committed)?;

        tracing::debug!(
            bucket = outcome.split_bucket,
            new_bucket = outcome.new_bucket,
            local_depth = outcome.local_depth,
            doubled = outcome.doubled,
            moved = outcome.moved,
            "split bucket"
        );
        splits.push(outcome);

        if settings.policy == SplitPolicy::Once {
            break;
        }
    }

    Ok(ApplyOutcome {
        bucket: directory.lookup(entry.key_hash),
        splits,
    })
}

/// Stats for one consolidation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub buckets_rewritten: usize,
    pub entries_written: usize,
    /// Staged buckets and their merged entry counts, in staging order
    pub staged: Vec<(BucketId, usize)>,
}

/// Stage a merged, sorted file for every dirty bucket
///
/// Nothing visible changes: bucket files and overlays stay as they are
/// until [`publish`]. Callers record the directory durably in between, so
/// a crash leaves either the old files or a complete set of staged ones.
pub fn consolidate(
    directory: &Directory,
    storage: &mut impl BucketStorage,
) -> Result<ConsolidationReport> {
    let mut report = ConsolidationReport::default();

    for id in directory.dirty_buckets() {
        let committed = storage.read_committed(id)?;
        let merged = directory.bucket(id)?.merge(&committed);

        storage.stage(id, &merged)?;

        report.buckets_rewritten += 1;
        report.entries_written += merged.len();
        report.staged.push((id, merged.len()));
    }

    Ok(report)
}

/// Move staged files into place and reset the overlays they absorbed
pub fn publish(
    directory: &mut Directory,
    storage: &mut impl BucketStorage,
    report: &ConsolidationReport,
) -> Result<()> {
    for &(id, len) in &report.staged {
        storage.publish(id)?;
        directory.bucket_mut(id)?.mark_consolidated(len);
    }
    Ok(())
}
