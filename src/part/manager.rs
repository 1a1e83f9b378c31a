//! Part File Manager
//!
//! Owns the current part file and rolls over to a new one once the size
//! threshold is crossed.

use std::io::Write;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::codec::Codec;
use crate::error::{PackError, Result};
use crate::index::IndexEntry;
use crate::layout::Layout;
use crate::storage::{CreateOptions, Store, StoreWriter};

use super::RECORD_HEADER_SIZE;

/// Writes payload records to `part-<n>` files
pub struct PartFileManager {
    store: Arc<dyn Store>,
    layout: Layout,
    options: CreateOptions,
    part_max_size: u64,
    current_id: i32,
    writer: Box<dyn StoreWriter>,
}

impl PartFileManager {
    /// Start writing to `part-<id>`, creating it if it does not exist
    ///
    /// An existing file is appended to, so a part created just before a
    /// crash is reused rather than clobbered.
    pub fn open(
        store: Arc<dyn Store>,
        layout: Layout,
        options: CreateOptions,
        part_max_size: u64,
        id: i32,
    ) -> Result<Self> {
        let writer = Self::open_writer(store.as_ref(), &layout, &options, id)?;
        Ok(Self {
            store,
            layout,
            options,
            part_max_size,
            current_id: id,
            writer,
        })
    }

    fn open_writer(
        store: &dyn Store,
        layout: &Layout,
        options: &CreateOptions,
        id: i32,
    ) -> Result<Box<dyn StoreWriter>> {
        let path = layout.part_path(id);
        if store.exists(&path)? {
            return store.append(&path);
        }
        let mut writer = store.create(&path, options)?;
        writer.sync()?;
        Ok(writer)
    }

    pub fn current_id(&self) -> i32 {
        self.current_id
    }

    pub fn current_name(&self) -> String {
        Layout::part_name(self.current_id)
    }

    /// End of the current part file
    pub fn position(&self) -> u64 {
        self.writer.position()
    }

    /// Bytes left before the rollover threshold (may be negative)
    pub fn remaining(&self) -> i64 {
        self.part_max_size as i64 - self.position() as i64
    }

    /// Compress `content`, append it as one record and flush it
    ///
    /// Returns `(offset, size)` of the record in the current part file.
    pub fn append_payload(&mut self, codec: &dyn Codec, content: &[u8]) -> Result<(i64, i32)> {
        let compressed = codec.compress(content)?;
        let uncompressed_len = i32::try_from(content.len()).map_err(|_| {
            PackError::SizeLimitExceeded {
                size: content.len() as u64,
                limit: i32::MAX as u64,
            }
        })?;

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + compressed.len());
        record.put_i32(uncompressed_len);
        record.put_i32(compressed.len() as i32);
        record.put_slice(&compressed);

        let offset = self.writer.position();
        self.writer.write_all(&record)?;
        self.writer.sync()?;
        let size = self.writer.position() - offset;

        Ok((offset as i64, size as i32))
    }

    /// Close the current part and start `part-<id + 1>`
    pub fn roll_over(&mut self) -> Result<i32> {
        self.writer.sync()?;
        let next = self.current_id + 1;
        self.writer = Self::open_writer(self.store.as_ref(), &self.layout, &self.options, next)?;
        self.current_id = next;
        Ok(next)
    }

    /// Read back and decompress the payload `entry` points at
    pub fn read_payload(&self, codec: &dyn Codec, entry: &IndexEntry) -> Result<Vec<u8>> {
        let size = usize::try_from(entry.size)
            .ok()
            .filter(|&s| s >= RECORD_HEADER_SIZE)
            .ok_or_else(|| PackError::Corruption(format!("bad record size {}", entry.size)))?;
        let offset = u64::try_from(entry.offset)
            .map_err(|_| PackError::Corruption(format!("bad record offset {}", entry.offset)))?;

        let raw = self
            .store
            .read_at(&self.layout.part_path(entry.part_id), offset, size)?;
        let mut buf = &raw[..];
        let uncompressed_len = buf.get_i32();
        let compressed_len = buf.get_i32();
        if compressed_len < 0 || compressed_len as usize != buf.remaining() || uncompressed_len < 0 {
            return Err(PackError::Corruption(format!(
                "record at part-{}:{} has inconsistent lengths",
                entry.part_id, entry.offset
            )));
        }

        codec.decompress(buf, uncompressed_len as usize)
    }

    /// Flush the current part file
    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()?;
        Ok(())
    }
}
