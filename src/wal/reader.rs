//! WAL Reader
//!
//! Reads entries back from the WAL in append order.

use std::io::{self, Read};
use std::path::Path;

use crate::error::Result;
use crate::index::{IndexEntry, ENTRY_SIZE};
use crate::storage::Store;

/// Sequential reader over WAL records
pub struct WalReader {
    reader: Box<dyn Read + Send>,
    /// Bytes of an incomplete trailing record, once reached
    torn_tail: usize,
    done: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(store: &dyn Store, path: &Path) -> Result<Self> {
        Ok(Self {
            reader: store.open(path)?,
            torn_tail: 0,
            done: false,
        })
    }

    /// Read the next entry; `None` at end of log or at a torn tail
    pub fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = [0u8; ENTRY_SIZE];
        let filled = read_full(&mut self.reader, &mut buf)?;

        if filled < ENTRY_SIZE {
            self.done = true;
            self.torn_tail = filled;
            return Ok(None);
        }
        Ok(Some(IndexEntry::decode(&mut &buf[..])))
    }

    /// Size of the incomplete trailing record (0 if the log ended cleanly)
    pub fn torn_tail(&self) -> usize {
        self.torn_tail
    }

    /// Iterate over all complete entries
    pub fn entries(self) -> WalIterator {
        WalIterator { reader: self }
    }
}

/// Fill `buf` as far as the stream allows
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
}

impl WalIterator {
    pub fn torn_tail(&self) -> usize {
        self.reader.torn_tail()
    }
}

impl Iterator for WalIterator {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_entry().transpose()
    }
}
