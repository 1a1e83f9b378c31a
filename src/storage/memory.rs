//! In-memory store
//!
//! Every file keeps its full contents plus the length that has been
//! synced. `simulate_crash` throws away whatever was never synced, which
//! is how the crash-recovery tests model a process dying mid-write.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

use super::{CreateOptions, Store, StoreWriter};

#[derive(Debug, Default)]
struct MemFile {
    data: Vec<u8>,
    synced: usize,
}

#[derive(Debug, Default)]
struct MemoryFs {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryFs {
    fn add_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

/// Shared in-memory store; clones see the same files
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    fs: Arc<Mutex<MemoryFs>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every unsynced byte, as if the process died right now
    pub fn simulate_crash(&self) {
        let mut fs = self.fs.lock();
        for file in fs.files.values_mut() {
            let synced = file.synced;
            file.data.truncate(synced);
        }
    }

    /// Paths of all files, sorted
    pub fn files(&self) -> Vec<PathBuf> {
        self.fs.lock().files.keys().cloned().collect()
    }

    /// Current contents of a file, synced or not
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.fs.lock().files.get(path).map(|f| f.data.clone())
    }

    /// Overwrite a file's contents and mark them synced
    pub fn put_contents(&self, path: &Path, data: Vec<u8>) {
        let mut fs = self.fs.lock();
        fs.add_ancestors(path);
        let synced = data.len();
        fs.files.insert(path.to_path_buf(), MemFile { data, synced });
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

struct MemoryWriter {
    fs: Arc<Mutex<MemoryFs>>,
    path: PathBuf,
    position: u64,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut fs = self.fs.lock();
        let file = fs.files.get_mut(&self.path).ok_or_else(|| not_found(&self.path))?;
        file.data.extend_from_slice(buf);
        self.position = file.data.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StoreWriter for MemoryWriter {
    fn position(&self) -> u64 {
        self.position
    }

    fn sync(&mut self) -> io::Result<()> {
        let mut fs = self.fs.lock();
        let file = fs.files.get_mut(&self.path).ok_or_else(|| not_found(&self.path))?;
        file.synced = file.data.len();
        Ok(())
    }
}

impl Store for MemoryStore {
    fn exists(&self, path: &Path) -> Result<bool> {
        let fs = self.fs.lock();
        Ok(fs.files.contains_key(path) || fs.dirs.contains(path))
    }

    fn mkdirs(&self, path: &Path) -> Result<()> {
        let mut fs = self.fs.lock();
        fs.add_ancestors(path);
        fs.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn create(&self, path: &Path, options: &CreateOptions) -> Result<Box<dyn StoreWriter>> {
        let mut fs = self.fs.lock();
        if fs.files.contains_key(path) && !options.overwrite {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            )
            .into());
        }
        fs.add_ancestors(path);
        fs.files.insert(path.to_path_buf(), MemFile::default());

        Ok(Box::new(MemoryWriter {
            fs: Arc::clone(&self.fs),
            path: path.to_path_buf(),
            position: 0,
        }))
    }

    fn append(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        let fs = self.fs.lock();
        let file = fs.files.get(path).ok_or_else(|| not_found(path))?;

        Ok(Box::new(MemoryWriter {
            fs: Arc::clone(&self.fs),
            path: path.to_path_buf(),
            position: file.data.len() as u64,
        }))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let fs = self.fs.lock();
        let file = fs.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(file.data.clone())))
    }

    fn len(&self, path: &Path) -> Result<u64> {
        let fs = self.fs.lock();
        let file = fs.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(file.data.len() as u64)
    }

    fn delete(&self, path: &Path, recursive: bool) -> Result<bool> {
        let mut fs = self.fs.lock();
        if fs.files.remove(path).is_some() {
            return Ok(true);
        }
        if !fs.dirs.contains(path) {
            return Ok(false);
        }

        let has_children = fs.files.keys().any(|p| p.starts_with(path) && p != path)
            || fs.dirs.iter().any(|p| p.starts_with(path) && p != path);
        if has_children && !recursive {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("directory not empty: {}", path.display()),
            )
            .into());
        }

        fs.files.retain(|p, _| !p.starts_with(path));
        fs.dirs.retain(|p| !p.starts_with(path));
        Ok(true)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut fs = self.fs.lock();
        let file = fs.files.remove(from).ok_or_else(|| not_found(from))?;
        fs.add_ancestors(to);
        fs.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let fs = self.fs.lock();
        Ok(fs
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }
}
