//! Store metadata
//!
//! One small record holding global configuration, the positional counters
//! and the directory state. It is rewritten whole (staged file + rename)
//! after bootstrap, after every part rollover and after consolidation. The
//! rename is also the commit point of a consolidation.
//!
//! ## Record Format (big-endian)
//! ```text
//! i32 replication_factor
//! i32 bucket_capacity
//! u16 len + UTF-8  current_part_name
//! i32 used_part_position
//! i32 last_bucket_id
//! i32 global_depth
//! i32 bucket_count, then per bucket: i32 id, i32 local_depth
//! 2^global_depth x i32 slot bucket id
//! ```

use std::io::{Read, Write};
use std::path::PathBuf;

use bytes::{Buf, BufMut};

use crate::error::{PackError, Result};
use crate::index::{BucketId, DirectorySnapshot};
use crate::layout::Layout;
use crate::storage::{CreateOptions, Store, StoreWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub replication_factor: i32,
    pub bucket_capacity: i32,
    pub current_part_name: String,
    /// Id of the current part file
    pub used_part_position: i32,
    pub last_bucket_id: BucketId,
    pub directory: DirectorySnapshot,
}

impl Metadata {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let name = self.current_part_name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            PackError::InvalidInput(format!("part name too long: {}", self.current_part_name))
        })?;

        let dir = &self.directory;
        let mut buf = Vec::with_capacity(32 + name.len() + dir.buckets.len() * 8 + dir.slots.len() * 4);
        buf.put_i32(self.replication_factor);
        buf.put_i32(self.bucket_capacity);
        buf.put_u16(name_len);
        buf.put_slice(name);
        buf.put_i32(self.used_part_position);
        buf.put_i32(self.last_bucket_id);

        buf.put_i32(dir.global_depth as i32);
        buf.put_i32(dir.buckets.len() as i32);
        for &(id, local_depth) in &dir.buckets {
            buf.put_i32(id);
            buf.put_i32(local_depth as i32);
        }
        for &slot in &dir.slots {
            buf.put_i32(slot);
        }
        Ok(buf)
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let replication_factor = get_i32(&mut buf, "replication factor")?;
        let bucket_capacity = get_i32(&mut buf, "bucket capacity")?;

        need(&buf, 2, "part name length")?;
        let name_len = buf.get_u16() as usize;
        need(&buf, name_len, "part name")?;
        let current_part_name = String::from_utf8(buf[..name_len].to_vec())
            .map_err(|_| PackError::Corruption("part name is not UTF-8".to_string()))?;
        buf.advance(name_len);

        let used_part_position = get_i32(&mut buf, "used part position")?;
        let last_bucket_id = get_i32(&mut buf, "last bucket id")?;

        let global_depth = get_depth(&mut buf, "global depth")?;
        let bucket_count = get_i32(&mut buf, "bucket count")?;
        if bucket_count < 0 {
            return Err(PackError::Corruption(format!("bucket count {}", bucket_count)));
        }
        let mut buckets = Vec::with_capacity(bucket_count as usize);
        for _ in 0..bucket_count {
            let id = get_i32(&mut buf, "bucket id")?;
            let local_depth = get_depth(&mut buf, "local depth")?;
            buckets.push((id, local_depth));
        }

        let slot_count = 1usize << global_depth;
        need(&buf, slot_count * 4, "directory slots")?;
        let slots = (0..slot_count).map(|_| buf.get_i32()).collect();

        if buf.has_remaining() {
            return Err(PackError::Corruption(format!(
                "{} trailing bytes after metadata",
                buf.remaining()
            )));
        }

        Ok(Self {
            replication_factor,
            bucket_capacity,
            current_part_name,
            used_part_position,
            last_bucket_id,
            directory: DirectorySnapshot {
                global_depth,
                buckets,
                slots,
            },
        })
    }

    /// Read the metadata file, if there is one
    pub fn load(store: &dyn Store, layout: &Layout) -> Result<Option<Self>> {
        let path = layout.metadata_path();
        if !store.exists(&path)? {
            return Ok(None);
        }
        let mut raw = Vec::new();
        store.open(&path)?.read_to_end(&mut raw)?;
        Self::decode(&raw).map(Some)
    }

    /// Replace the metadata file
    pub fn persist(&self, store: &dyn Store, layout: &Layout, options: &CreateOptions) -> Result<()> {
        self.stage(store, layout, options)?;
        Self::commit(store, layout)
    }

    /// Durably write the record beside the current metadata file
    ///
    /// Until [`Metadata::commit`] runs, the staged record marks work that
    /// never took effect.
    pub fn stage(&self, store: &dyn Store, layout: &Layout, options: &CreateOptions) -> Result<()> {
        let bytes = self.encode()?;
        let mut writer = store.create(
            &Self::staged_path(layout),
            &CreateOptions {
                overwrite: true,
                ..*options
            },
        )?;
        writer.write_all(&bytes)?;
        writer.sync()?;
        Ok(())
    }

    /// Atomically make the staged record current
    pub fn commit(store: &dyn Store, layout: &Layout) -> Result<()> {
        store.rename(&Self::staged_path(layout), &layout.metadata_path())
    }

    /// Whether a staged record was left behind
    pub fn has_staged(store: &dyn Store, layout: &Layout) -> Result<bool> {
        store.exists(&Self::staged_path(layout))
    }

    /// Drop a staged record that was never committed
    pub fn discard_staged(store: &dyn Store, layout: &Layout) -> Result<bool> {
        store.delete(&Self::staged_path(layout), false)
    }

    fn staged_path(layout: &Layout) -> PathBuf {
        Layout::rewrite_path(&layout.metadata_path())
    }
}

fn need(buf: &&[u8], n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(PackError::Corruption(format!("metadata ends inside {}", what)));
    }
    Ok(())
}

fn get_i32(buf: &mut &[u8], what: &str) -> Result<i32> {
    need(buf, 4, what)?;
    Ok(buf.get_i32())
}

fn get_depth(buf: &mut &[u8], what: &str) -> Result<u32> {
    let depth = get_i32(buf, what)?;
    if !(0..=30).contains(&depth) {
        return Err(PackError::Corruption(format!("{} out of range: {}", what, depth)));
    }
    Ok(depth as u32)
}
