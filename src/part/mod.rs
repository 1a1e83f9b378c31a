//! Part File Module
//!
//! Append-only containers holding the compressed payloads of many small
//! files.
//!
//! ## Payload Record Format (big-endian)
//! ```text
//! ┌──────────────────────┬─────────────────────┬──────────────────┐
//! │ UncompressedLen (4)  │ CompressedLen (4)   │ Compressed bytes │
//! └──────────────────────┴─────────────────────┴──────────────────┘
//! ```
//! The index entry of a payload records the record's starting offset and
//! its total size.

mod manager;

pub use manager::PartFileManager;

/// Bytes preceding the compressed payload in a record
pub const RECORD_HEADER_SIZE: usize = 8;
