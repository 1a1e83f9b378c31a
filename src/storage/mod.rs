//! Storage Module
//!
//! Path-addressed durable store the engine writes through.
//!
//! ## Responsibilities
//! - Create / append / open / delete / rename / list files by path
//! - Flush appended bytes to durable storage on demand (`sync`)
//! - Carry replication and block-size hints to backends that use them
//!
//! ## Backends
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────────────────┐
//! │  LocalStore  │   │ MemoryStore                              │
//! │  (std::fs)   │   │ synced / unsynced bytes, simulate_crash()│
//! └──────────────┘   └──────────────────────────────────────────┘
//! ```

mod local;
mod memory;

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use local::LocalStore;
pub use memory::MemoryStore;

/// Hints for `Store::create`
///
/// Replication and block size are opaque to the engine; backends that
/// have no use for them ignore them.
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    /// Replace an existing file instead of failing
    pub overwrite: bool,
    /// Writer buffer size
    pub buffer_size: usize,
    /// Replication factor
    pub replication: i32,
    /// Block size
    pub block_size: u64,
}

/// Append-only handle returned by `create` and `append`
pub trait StoreWriter: Write + Send {
    /// Current end-of-file position, including buffered bytes
    fn position(&self) -> u64;

    /// Push every written byte to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

/// Path-addressed durable file store
pub trait Store: Send + Sync + fmt::Debug {
    /// Whether a file or directory exists at `path`
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all of its parents
    fn mkdirs(&self, path: &Path) -> Result<()>;

    /// Create a file and open it for writing
    ///
    /// Fails with `AlreadyExists` when the file exists and
    /// `options.overwrite` is false.
    fn create(&self, path: &Path, options: &CreateOptions) -> Result<Box<dyn StoreWriter>>;

    /// Open an existing file for appending, positioned at its end
    fn append(&self, path: &Path) -> Result<Box<dyn StoreWriter>>;

    /// Open an existing file for sequential reading
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Length of a file in bytes
    fn len(&self, path: &Path) -> Result<u64>;

    /// Delete a file or directory. Returns false when nothing was there.
    fn delete(&self, path: &Path, recursive: bool) -> Result<bool>;

    /// Atomically move `from` to `to`, replacing `to` if present
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Files directly inside `dir`, sorted. Empty if `dir` does not exist.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Read `len` bytes starting at `offset`
    fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut reader = self.open(path)?;
        io::copy(&mut (&mut reader).take(offset), &mut io::sink())?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}
