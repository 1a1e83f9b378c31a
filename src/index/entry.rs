//! Index entry record
//!
//! Fixed 24-byte big-endian record shared by bucket files and the WAL:
//! `i64 key_hash | i32 part_id | i64 offset | i32 size`.

use std::io::Read;

use bytes::{Buf, BufMut};

use crate::error::Result;
use crate::hash::KeyHash;

/// Encoded size of one entry
pub const ENTRY_SIZE: usize = 24;

/// Location of one stored file
///
/// Ordering is by key hash first, then part, offset and size, which is the
/// order bucket files are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry {
    pub key_hash: KeyHash,
    pub part_id: i32,
    pub offset: i64,
    pub size: i32,
}

impl IndexEntry {
    pub fn new(key_hash: KeyHash, part_id: i32, offset: i64, size: i32) -> Self {
        Self {
            key_hash,
            part_id,
            offset,
            size,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.key_hash);
        buf.put_i32(self.part_id);
        buf.put_i64(self.offset);
        buf.put_i32(self.size);
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Decode one entry; `buf` must hold at least `ENTRY_SIZE` bytes
    pub fn decode(buf: &mut impl Buf) -> Self {
        Self {
            key_hash: buf.get_i64(),
            part_id: buf.get_i32(),
            offset: buf.get_i64(),
            size: buf.get_i32(),
        }
    }
}

/// Read every whole entry from `reader`
///
/// Returns the entries in file order and the number of trailing bytes that
/// did not form a complete record.
pub fn read_entries(reader: &mut dyn Read) -> Result<(Vec<IndexEntry>, usize)> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    let mut chunks = raw.chunks_exact(ENTRY_SIZE);
    let entries = chunks
        .by_ref()
        .map(|mut chunk| IndexEntry::decode(&mut chunk))
        .collect();
    Ok((entries, chunks.remainder().len()))
}
