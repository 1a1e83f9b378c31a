//! WAL Recovery
//!
//! Loads the entries a crashed writer logged but never consolidated.

use std::path::Path;

use crate::error::Result;
use crate::index::IndexEntry;
use crate::storage::Store;

use super::WalReader;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of complete entries read
    pub entries_recovered: u64,

    /// Whether an incomplete trailing record was ignored
    pub was_truncated: bool,

    /// Size of that trailing record in bytes
    pub torn_bytes: usize,
}

impl WalRecovery {
    /// Read every complete entry of the WAL at `path`, in append order
    pub fn recover(store: &dyn Store, path: &Path) -> Result<(Vec<IndexEntry>, RecoveryResult)> {
        let mut reader = WalReader::open(store, path)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry()? {
            entries.push(entry);
        }

        let result = RecoveryResult {
            entries_recovered: entries.len() as u64,
            was_truncated: reader.torn_tail() > 0,
            torn_bytes: reader.torn_tail(),
        };

        if result.was_truncated {
            tracing::warn!(
                path = %path.display(),
                bytes = result.torn_bytes,
                "ignoring torn record at end of WAL"
            );
        }

        Ok((entries, result))
    }

    /// Inspect a WAL without keeping its entries
    pub fn verify(store: &dyn Store, path: &Path) -> Result<RecoveryResult> {
        let mut iter = WalReader::open(store, path)?.entries();
        let mut count = 0u64;
        for entry in iter.by_ref() {
            entry?;
            count += 1;
        }

        Ok(RecoveryResult {
            entries_recovered: count,
            was_truncated: iter.torn_tail() > 0,
            torn_bytes: iter.torn_tail(),
        })
    }
}
