//! On-disk naming
//!
//! File names inside a store directory are part of the format and must not
//! change: `metadata`, `part-<n>`, `index-<n>` and the WAL `index-tmp`.

use std::path::{Path, PathBuf};

use crate::index::BucketId;

pub const METADATA_NAME: &str = "metadata";
pub const PART_PREFIX: &str = "part-";
pub const INDEX_PREFIX: &str = "index-";
pub const WAL_NAME: &str = "index-tmp";

/// Suffix for files being rewritten before they are renamed into place
const REWRITE_SUFFIX: &str = ".rewrite";

/// Resolves store file names under a root directory
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_NAME)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.root.join(WAL_NAME)
    }

    pub fn part_name(id: i32) -> String {
        format!("{}{}", PART_PREFIX, id)
    }

    pub fn part_path(&self, id: i32) -> PathBuf {
        self.root.join(Self::part_name(id))
    }

    pub fn bucket_path(&self, id: BucketId) -> PathBuf {
        self.root.join(format!("{}{}", INDEX_PREFIX, id))
    }

    /// Sibling path used while a file is rewritten
    pub fn rewrite_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(REWRITE_SUFFIX);
        PathBuf::from(name)
    }

    /// Bucket file a staged `index-<n>.rewrite` replaces, if `path` is one
    pub fn staged_bucket_target(path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?.to_str()?;
        let target = name.strip_suffix(REWRITE_SUFFIX)?;
        let id = target.strip_prefix(INDEX_PREFIX)?;
        id.parse::<BucketId>().ok()?;
        Some(path.with_file_name(target))
    }

    /// "part-42" → Some(42)
    pub fn parse_part_name(name: &str) -> Option<i32> {
        name.strip_prefix(PART_PREFIX)?.parse().ok()
    }
}
