//! Write-Ahead Log (WAL) Module
//!
//! Durable log of index entries that are not yet in their bucket file.
//!
//! ## Responsibilities
//! - Append each entry (and flush it) before the insert counts as committed
//! - Replay entries in append order after a crash
//! - Disappear once every pending entry has been consolidated
//!
//! ## File Format (`index-tmp`)
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Entry 1: IndexEntry record (24 bytes)        │
//! ├──────────────────────────────────────────────┤
//! │ Entry 2: IndexEntry record (24 bytes)        │
//! ├──────────────────────────────────────────────┤
//! │ ... optional torn tail (< 24 bytes) ...      │
//! └──────────────────────────────────────────────┘
//! ```
//! There is no checksum; a tail shorter than one record is an append that
//! was never acknowledged and is ignored.

mod reader;
mod recovery;
mod writer;

pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
