//! Engine Module
//!
//! The ingestion engine that coordinates all components.
//!
//! ## Responsibilities
//! - Bootstrap a new store or load an existing one
//! - Replay and consolidate a leftover WAL on startup
//! - Append payloads, log their index entries and route them to buckets
//! - Roll part files over and consolidate buckets on close
//!
//! ## Durability Order of `put`
//! ```text
//! payload append + sync ─▶ WAL append + sync ─▶ bucket overlay (+ split)
//!                                                     │
//!                              part full? ─▶ roll over + persist metadata
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{Codec, ZstdCodec};
use crate::config::Config;
use crate::error::{PackError, Result};
use crate::hash::key_hash;
use crate::index::{
    self, Bucket, BucketFiles, BucketId, BucketStorage, ConsolidationReport, Directory,
    DirectorySnapshot, IndexEntry, SplitSettings,
};
use crate::layout::Layout;
use crate::metadata::Metadata;
use crate::part::PartFileManager;
use crate::storage::{CreateOptions, LocalStore, Store};
use crate::wal::{RecoveryResult, WalRecovery, WalWriter};

/// The main ingestion engine
///
/// ## Concurrency Model: Single Writer
///
/// One engine owns a store directory; nothing here coordinates two engines
/// on the same directory. Inside one engine every mutating operation runs
/// under `state`, so the payload append, WAL append, overlay insert and any
/// split happen as one unit and the WAL order equals the insert order.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// File names inside the store directory
    layout: Layout,

    /// Durable store all files go through
    store: Arc<dyn Store>,

    /// Payload compression
    codec: Arc<dyn Codec>,

    /// Mutable engine state (exclusive access)
    state: Mutex<EngineState>,

    /// Outcome of the WAL replay run by `open`, if one was needed
    recovery: Option<RecoveryResult>,
}

struct EngineState {
    directory: Directory,
    last_bucket_id: BucketId,

    /// Directory and bucket counter as of the last finished consolidation.
    /// This is what metadata records, since it matches the bucket files.
    consolidated: (DirectorySnapshot, BucketId),

    parts: PartFileManager,

    /// Opened lazily by the first insert after a consolidation
    wal: Option<WalWriter>,
}

/// Point-in-time view of the engine
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub global_depth: u32,
    pub slots: Vec<BucketId>,
    pub buckets: Vec<BucketStats>,
    pub last_bucket_id: BucketId,
    pub current_part_id: i32,
    pub current_part_position: u64,
    pub wal_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    pub id: BucketId,
    pub local_depth: u32,
    pub logical_size: usize,
    pub dirty: bool,
}

impl Engine {
    /// Open or create a store on the local filesystem
    ///
    /// On startup:
    /// 1. Bootstrap the directory if it has no metadata yet
    /// 2. Otherwise load metadata and reopen the current part file
    /// 3. Replay and consolidate the WAL if one exists
    pub fn open(config: Config) -> Result<Self> {
        let codec = Arc::new(ZstdCodec::new(config.compression_level));
        Self::open_with(config, Arc::new(LocalStore::new()), codec)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Open against an explicit store and codec
    pub fn open_with(
        mut config: Config,
        store: Arc<dyn Store>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        config.validate()?;
        let layout = Layout::new(&config.data_dir);

        Self::resume_consolidation(store.as_ref(), &layout)?;

        let existing = Metadata::load(store.as_ref(), &layout)?;
        if let Some(metadata) = &existing {
            // Replication is fixed when the store is created
            if metadata.replication_factor != config.replication_factor {
                tracing::info!(
                    configured = config.replication_factor,
                    stored = metadata.replication_factor,
                    "keeping stored replication factor"
                );
                config.replication_factor = metadata.replication_factor;
            }
        }

        let state = match existing {
            None => Self::bootstrap(&config, &layout, &store)?,
            Some(metadata) => Self::load(&config, &layout, &store, metadata)?,
        };

        let mut engine = Self {
            config,
            layout,
            store,
            codec,
            state: Mutex::new(state),
            recovery: None,
        };
        engine.recovery = engine.recover()?;

        Ok(engine)
    }

    fn bootstrap(config: &Config, layout: &Layout, store: &Arc<dyn Store>) -> Result<EngineState> {
        store.mkdirs(layout.root())?;

        let mut last_bucket_id = 0;
        let index_options = index_create_options(config);
        let files = BucketFiles::new(store.as_ref(), layout, index_options, &mut last_bucket_id);
        let committed = files.ensure(0)?;

        let directory = Directory::new(Bucket::new(0, 0, committed));
        let parts = PartFileManager::open(
            Arc::clone(store),
            layout.clone(),
            part_create_options(config),
            config.part_max_size,
            0,
        )?;

        let state = EngineState {
            consolidated: (directory.snapshot(), last_bucket_id),
            directory,
            last_bucket_id,
            parts,
            wal: None,
        };
        Self::persist_metadata(config, layout, store.as_ref(), &state)?;

        tracing::info!(dir = %layout.root().display(), "created new store");
        Ok(state)
    }

    fn load(
        config: &Config,
        layout: &Layout,
        store: &Arc<dyn Store>,
        metadata: Metadata,
    ) -> Result<EngineState> {
        let directory = Directory::from_snapshot(&metadata.directory, |id| {
            index::committed_len(store.as_ref(), &layout.bucket_path(id))
        })?;

        if Layout::parse_part_name(&metadata.current_part_name) != Some(metadata.used_part_position) {
            return Err(PackError::Corruption(format!(
                "current part {} does not match part position {}",
                metadata.current_part_name, metadata.used_part_position
            )));
        }

        let parts = PartFileManager::open(
            Arc::clone(store),
            layout.clone(),
            part_create_options(config),
            config.part_max_size,
            metadata.used_part_position,
        )?;

        tracing::info!(
            dir = %layout.root().display(),
            global_depth = directory.global_depth(),
            buckets = directory.bucket_count(),
            part = metadata.used_part_position,
            remaining = parts.remaining(),
            "opened existing store"
        );

        Ok(EngineState {
            consolidated: (metadata.directory.clone(), metadata.last_bucket_id),
            directory,
            last_bucket_id: metadata.last_bucket_id,
            parts,
            wal: None,
        })
    }

    /// Settle a consolidation that a crash cut short
    ///
    /// A staged metadata record means the commit rename never happened: the
    /// bucket files and the WAL still describe the store, so staged bucket
    /// files are dropped. Without one, any staged bucket file belongs to the
    /// committed directory and is moved into place.
    fn resume_consolidation(store: &dyn Store, layout: &Layout) -> Result<()> {
        let staged: Vec<(PathBuf, PathBuf)> = store
            .list(layout.root())?
            .into_iter()
            .filter_map(|path| Layout::staged_bucket_target(&path).map(|target| (path, target)))
            .collect();

        if Metadata::has_staged(store, layout)? {
            for (path, _) in &staged {
                store.delete(path, false)?;
            }
            Metadata::discard_staged(store, layout)?;
            tracing::warn!(
                buckets = staged.len(),
                "discarded uncommitted consolidation"
            );
            return Ok(());
        }

        for (path, target) in &staged {
            store.rename(path, target)?;
        }
        if !staged.is_empty() {
            tracing::info!(buckets = staged.len(), "finished interrupted consolidation");
        }
        Ok(())
    }

    /// Replay a leftover WAL through the insert path, then consolidate
    fn recover(&self) -> Result<Option<RecoveryResult>> {
        let wal_path = self.layout.wal_path();
        if !self.store.exists(&wal_path)? {
            return Ok(None);
        }

        let (entries, result) = WalRecovery::recover(self.store.as_ref(), &wal_path)?;

        let mut guard = self.lock_state()?;
        let state = &mut *guard;
        for entry in entries {
            self.apply(state, entry)?;
        }
        let report = self.consolidate(state)?;

        tracing::info!(
            entries = result.entries_recovered,
            truncated = result.was_truncated,
            buckets = report.buckets_rewritten,
            "recovered WAL"
        );
        Ok(Some(result))
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Store `content` under `key`
    ///
    /// Steps:
    /// 1. Compress and append the payload to the current part file, sync
    /// 2. Append the index entry to the WAL, sync
    /// 3. Insert into the bucket overlay, splitting on overflow
    /// 4. Roll the part file over if it is full, persisting metadata
    ///
    /// On success the payload and its entry are durable in the part file
    /// and the WAL; the bucket file catches up at the next consolidation.
    pub fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        let limit = self.config.max_payload_size();
        if content.len() as u64 > limit {
            return Err(PackError::SizeLimitExceeded {
                size: content.len() as u64,
                limit,
            });
        }

        let mut guard = self.lock_state()?;
        let state = &mut *guard;

        // Step 1: payload first
        let (offset, size) = state.parts.append_payload(self.codec.as_ref(), content)?;
        let entry = IndexEntry::new(key_hash(key), state.parts.current_id(), offset, size);

        // Step 2: WAL before the entry counts as inserted
        if state.wal.is_none() {
            state.wal = Some(WalWriter::open(
                self.store.as_ref(),
                &self.layout.wal_path(),
                &index_create_options(&self.config),
            )?);
        }
        if let Some(wal) = state.wal.as_mut() {
            wal.append(&entry)?;
        }

        // Step 3: bucket overlay
        self.apply(state, entry)?;

        // Step 4: rollover
        if state.parts.remaining() <= 0 {
            let next = state.parts.roll_over()?;
            Self::persist_metadata(&self.config, &self.layout, self.store.as_ref(), state)?;
            tracing::info!(part = next, "rolled over to new part file");
        }

        Ok(())
    }

    /// Store a local file under `key`
    pub fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let meta = fs::metadata(path)?;
        if meta.is_dir() {
            return Err(PackError::InvalidInput(format!(
                "{} is a directory",
                path.display()
            )));
        }

        let limit = self.config.max_payload_size();
        if meta.len() > limit {
            return Err(PackError::SizeLimitExceeded {
                size: meta.len(),
                limit,
            });
        }

        let content = fs::read(path)?;
        self.put(key, &content)
    }

    /// Store a local file under its file name
    pub fn put_path(&self, path: &Path) -> Result<()> {
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackError::InvalidInput(format!("no file name in {}", path.display())))?
            .to_string();
        self.put_file(&key, path)
    }

    /// Consolidate every dirty bucket and drop the WAL
    pub fn flush(&self) -> Result<()> {
        let mut guard = self.lock_state()?;
        self.consolidate(&mut guard)?;
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Consolidates pending entries, persists metadata and removes the WAL.
    pub fn close(self) -> Result<()> {
        let mut guard = self.lock_state()?;
        self.consolidate(&mut guard)?;
        guard.parts.sync()?;
        Ok(())
    }

    // =========================================================================
    // Read-back
    // =========================================================================

    /// Most recent index entry whose hash matches `key`
    pub fn locate(&self, key: &str) -> Result<Option<IndexEntry>> {
        let hash = key_hash(key);
        let mut guard = self.lock_state()?;
        let state = &mut *guard;

        let id = state.directory.lookup(hash);
        let bucket = state.directory.bucket(id)?;
        let newest = |e: &&IndexEntry| (e.part_id, e.offset);

        if let Some(entry) = bucket.pending_new.iter().filter(|e| e.key_hash == hash).max_by_key(newest) {
            return Ok(Some(*entry));
        }

        let committed = self.bucket_files(&mut state.last_bucket_id).read_committed(id)?;
        let start = committed.partition_point(|e| e.key_hash < hash);
        Ok(committed[start..]
            .iter()
            .take_while(|e| e.key_hash == hash)
            .filter(|e| !bucket.pending_deleted.contains(*e))
            .max_by_key(newest)
            .copied())
    }

    /// Payload stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.locate(key)? {
            Some(entry) => {
                let guard = self.lock_state()?;
                guard.parts.read_payload(self.codec.as_ref(), &entry).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Live entries of a bucket (committed and pending), sorted
    pub fn bucket_entries(&self, id: BucketId) -> Result<Vec<IndexEntry>> {
        let mut guard = self.lock_state()?;
        let state = &mut *guard;
        let committed = self.bucket_files(&mut state.last_bucket_id).read_committed(id)?;
        Ok(state.directory.bucket(id)?.merge(&committed))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock_state(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|e| PackError::LockPoisoned(format!("Engine state lock poisoned: {}", e)))
    }

    fn bucket_files<'a>(&'a self, last_bucket_id: &'a mut BucketId) -> BucketFiles<'a> {
        BucketFiles::new(
            self.store.as_ref(),
            &self.layout,
            index_create_options(&self.config),
            last_bucket_id,
        )
    }

    fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            capacity: self.config.bucket_capacity as usize,
            policy: self.config.split_policy,
            max_global_depth: self.config.max_global_depth,
        }
    }

    /// Shared by `put` and WAL replay
    fn apply(&self, state: &mut EngineState, entry: IndexEntry) -> Result<()> {
        let settings = self.split_settings();
        let mut files = self.bucket_files(&mut state.last_bucket_id);
        index::apply_entry(&mut state.directory, entry, &settings, &mut files)?;
        Ok(())
    }

    /// Consolidate dirty buckets, persist metadata, delete the WAL
    ///
    /// Every bucket file is staged before the metadata rename commits the
    /// new directory, and only then moved into place. A crash at any point
    /// leaves either the previous files plus the WAL, or a committed
    /// directory whose staged files `resume_consolidation` publishes.
    fn consolidate(&self, state: &mut EngineState) -> Result<ConsolidationReport> {
        let snapshot = (state.directory.snapshot(), state.last_bucket_id);

        let report = match self.stage_and_commit(state, &snapshot) {
            Ok(report) => report,
            Err(e) => {
                self.discard_staged(state);
                return Err(e);
            }
        };

        state.consolidated = snapshot;
        state.wal = None;
        self.store.delete(&self.layout.wal_path(), false)?;

        {
            let mut files = self.bucket_files(&mut state.last_bucket_id);
            index::publish(&mut state.directory, &mut files, &report)?;
        }

        if report.buckets_rewritten > 0 {
            tracing::info!(
                buckets = report.buckets_rewritten,
                entries = report.entries_written,
                "consolidated buckets"
            );
        }
        Ok(report)
    }

    fn stage_and_commit(
        &self,
        state: &mut EngineState,
        snapshot: &(DirectorySnapshot, BucketId),
    ) -> Result<ConsolidationReport> {
        let (directory, last_bucket_id) = snapshot;
        let metadata = metadata_record(&self.config, &state.parts, directory, *last_bucket_id);
        metadata.stage(self.store.as_ref(), &self.layout, &index_create_options(&self.config))?;

        let report = {
            let mut files = self.bucket_files(&mut state.last_bucket_id);
            index::consolidate(&state.directory, &mut files)?
        };

        Metadata::commit(self.store.as_ref(), &self.layout)?;
        Ok(report)
    }

    /// Best effort: a failed consolidation must not leave staged files that
    /// a later commit would adopt
    fn discard_staged(&self, state: &EngineState) {
        for id in state.directory.dirty_buckets() {
            let staged = Layout::rewrite_path(&self.layout.bucket_path(id));
            if let Err(e) = self.store.delete(&staged, false) {
                tracing::warn!(bucket = id, error = %e, "could not remove staged bucket file");
            }
        }
        if let Err(e) = Metadata::discard_staged(self.store.as_ref(), &self.layout) {
            tracing::warn!(error = %e, "could not remove staged metadata");
        }
    }

    fn persist_metadata(
        config: &Config,
        layout: &Layout,
        store: &dyn Store,
        state: &EngineState,
    ) -> Result<()> {
        let (directory, last_bucket_id) = &state.consolidated;
        metadata_record(config, &state.parts, directory, *last_bucket_id).persist(
            store,
            layout,
            &index_create_options(config),
        )
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// WAL replay performed by `open`, if any
    pub fn recovery(&self) -> Option<&RecoveryResult> {
        self.recovery.as_ref()
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let guard = self.lock_state()?;
        Ok(EngineStats {
            global_depth: guard.directory.global_depth(),
            slots: guard.directory.slots().to_vec(),
            buckets: guard
                .directory
                .buckets()
                .map(|b| BucketStats {
                    id: b.id,
                    local_depth: b.local_depth,
                    logical_size: b.logical_size(),
                    dirty: b.dirty,
                })
                .collect(),
            last_bucket_id: guard.last_bucket_id,
            current_part_id: guard.parts.current_id(),
            current_part_position: guard.parts.position(),
            wal_active: guard.wal.is_some(),
        })
    }

    /// Check the directory invariants
    pub fn validate(&self) -> Result<()> {
        self.lock_state()?.directory.validate()
    }
}

fn metadata_record(
    config: &Config,
    parts: &PartFileManager,
    directory: &DirectorySnapshot,
    last_bucket_id: BucketId,
) -> Metadata {
    Metadata {
        replication_factor: config.replication_factor,
        bucket_capacity: config.bucket_capacity,
        current_part_name: parts.current_name(),
        used_part_position: parts.current_id(),
        last_bucket_id,
        directory: directory.clone(),
    }
}

fn index_create_options(config: &Config) -> CreateOptions {
    CreateOptions {
        overwrite: false,
        buffer_size: config.io_buffer_size,
        replication: config.replication_factor,
        block_size: config.index_block_size,
    }
}

fn part_create_options(config: &Config) -> CreateOptions {
    CreateOptions {
        overwrite: false,
        buffer_size: config.io_buffer_size,
        replication: config.replication_factor,
        block_size: config.block_size,
    }
}
