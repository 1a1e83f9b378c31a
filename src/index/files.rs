//! Bucket files in a store

use std::io::Write;
use std::path::Path;

use crate::error::{PackError, Result};
use crate::layout::Layout;
use crate::storage::{CreateOptions, Store, StoreWriter};

use super::{read_entries, BucketId, BucketStorage, IndexEntry, ENTRY_SIZE};

/// `index-<n>` files of one store directory
pub struct BucketFiles<'a> {
    store: &'a dyn Store,
    layout: &'a Layout,
    options: CreateOptions,
    last_bucket_id: &'a mut BucketId,
}

impl<'a> BucketFiles<'a> {
    pub fn new(
        store: &'a dyn Store,
        layout: &'a Layout,
        options: CreateOptions,
        last_bucket_id: &'a mut BucketId,
    ) -> Self {
        Self {
            store,
            layout,
            options,
            last_bucket_id,
        }
    }

    /// Create an empty bucket file if none exists
    pub fn ensure(&self, id: BucketId) -> Result<usize> {
        let path = self.layout.bucket_path(id);
        if self.store.exists(&path)? {
            return committed_len(self.store, &path);
        }
        let mut writer = self.store.create(&path, &self.options)?;
        writer.sync()?;
        Ok(0)
    }
}

/// Entry count of the bucket file at `path` (0 if it does not exist)
pub fn committed_len(store: &dyn Store, path: &Path) -> Result<usize> {
    if !store.exists(path)? {
        return Ok(0);
    }
    let len = store.len(path)? as usize;
    if len % ENTRY_SIZE != 0 {
        return Err(PackError::Corruption(format!(
            "bucket file {} has {} bytes, not a multiple of {}",
            path.display(),
            len,
            ENTRY_SIZE
        )));
    }
    Ok(len / ENTRY_SIZE)
}

impl BucketStorage for BucketFiles<'_> {
    fn read_committed(&mut self, id: BucketId) -> Result<Vec<IndexEntry>> {
        let path = self.layout.bucket_path(id);
        if !self.store.exists(&path)? {
            return Ok(Vec::new());
        }

        let mut reader = self.store.open(&path)?;
        let (entries, trailing) = read_entries(&mut reader)?;
        if trailing != 0 {
            return Err(PackError::Corruption(format!(
                "bucket file {} ends with a partial entry of {} bytes",
                path.display(),
                trailing
            )));
        }
        Ok(entries)
    }

    fn allocate(&mut self) -> Result<(BucketId, usize)> {
        let id = *self.last_bucket_id + 1;
        let existing = self.ensure(id)?;
        if existing > 0 {
            tracing::debug!(bucket = id, entries = existing, "reusing leftover bucket file");
        }
        *self.last_bucket_id = id;
        Ok((id, existing))
    }

    fn stage(&mut self, id: BucketId, entries: &[IndexEntry]) -> Result<()> {
        let staged = Layout::rewrite_path(&self.layout.bucket_path(id));

        let options = CreateOptions {
            overwrite: true,
            ..self.options
        };
        let mut writer = self.store.create(&staged, &options)?;
        let mut buf = Vec::with_capacity(entries.len() * ENTRY_SIZE);
        for entry in entries {
            entry.encode(&mut buf);
        }
        writer.write_all(&buf)?;
        writer.sync()?;
        Ok(())
    }

    fn publish(&mut self, id: BucketId) -> Result<()> {
        let path = self.layout.bucket_path(id);
        self.store.rename(&Layout::rewrite_path(&path), &path)
    }
}
