//! Local filesystem store
//!
//! Maps the store interface onto `std::fs`. Replication and block-size
//! hints have no meaning locally and are ignored.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::{CreateOptions, Store, StoreWriter};

/// Store backed by the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }
}

/// Buffered appender that tracks its own end-of-file position
struct LocalWriter {
    writer: BufWriter<File>,
    position: u64,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl StoreWriter for LocalWriter {
    fn position(&self) -> u64 {
        self.position
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

impl Store for LocalStore {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(path.exists())
    }

    fn mkdirs(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn create(&self, path: &Path, options: &CreateOptions) -> Result<Box<dyn StoreWriter>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut open = OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        let file = open.open(path)?;

        tracing::trace!(
            path = %path.display(),
            replication = options.replication,
            block_size = options.block_size,
            "created file"
        );

        Ok(Box::new(LocalWriter {
            writer: BufWriter::with_capacity(options.buffer_size.max(1), file),
            position: 0,
        }))
    }

    fn append(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        let file = OpenOptions::new().append(true).open(path)?;
        let position = file.metadata()?.len();

        Ok(Box::new(LocalWriter {
            writer: BufWriter::new(file),
            position,
        }))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn len(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn delete(&self, path: &Path, recursive: bool) -> Result<bool> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_dir(path)?;
            }
        } else {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}
