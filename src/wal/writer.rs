//! WAL Writer
//!
//! Appends index entries to the WAL file.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::index::IndexEntry;
use crate::storage::{CreateOptions, Store, StoreWriter};

/// Appends entries to the WAL, flushing after every record
pub struct WalWriter {
    path: PathBuf,
    writer: Box<dyn StoreWriter>,
    entries_written: u64,
}

impl WalWriter {
    /// Open the WAL for appending, creating it if needed
    pub fn open(store: &dyn Store, path: &Path, options: &CreateOptions) -> Result<Self> {
        let writer = if store.exists(path)? {
            store.append(path)?
        } else {
            store.create(
                path,
                &CreateOptions {
                    overwrite: false,
                    ..*options
                },
            )?
        };

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entries_written: 0,
        })
    }

    /// Append one entry and flush it to durable storage
    pub fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        self.writer.write_all(&entry.to_bytes())?;
        self.writer.sync()?;
        self.entries_written += 1;
        Ok(())
    }

    /// Force sync to durable storage
    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()?;
        Ok(())
    }

    /// Entries appended through this writer
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Current size of the WAL in bytes
    pub fn position(&self) -> u64 {
        self.writer.position()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
