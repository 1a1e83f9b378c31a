//! # AtlasPack
//!
//! Packs many small files into a few large append-only part files and
//! indexes them with an on-disk extendible-hash directory:
//! - Write-Ahead Logging (WAL) of index entries for crash recovery
//! - Bucket splits with directory doubling
//! - Consolidation of bucket overlays into sorted bucket files
//! - Pluggable durable store (local filesystem or in-memory)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Engine::put(key, bytes)                │
//! │                        (single writer)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌──────────────────┐
//!   │  PartFile   │ │     WAL     │   │ Directory/Bucket │
//!   │  (payload)  │ │ (index-tmp) │   │  (overlay+split) │
//!   └─────────────┘ └─────────────┘   └────────┬─────────┘
//!                                              │ close / recover
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │ index-<n> files  │
//!                                     │ + metadata       │
//!                                     └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod hash;
pub mod codec;
pub mod layout;
pub mod storage;
pub mod part;
pub mod wal;
pub mod index;
pub mod metadata;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{PackError, Result};
pub use config::{Config, SplitPolicy};
pub use engine::{BucketStats, Engine, EngineStats};
pub use index::IndexEntry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasPack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
