//! Typed errors of the segment allocator and the shared table.
//!
//! Library code returns [`ShmError`]; the CLI wraps it into `anyhow` with context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShmError {
    /// The OS refused to create, size or map the segment.
    #[error("cannot create shared segment '{name}': {source}")]
    SegmentCreateFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Attach to a name that has no segment behind it.
    #[error("shared segment '{0}' not found")]
    SegmentNotFound(String),

    /// The object exists but does not carry a valid program-break header.
    #[error("shared segment '{name}' is not usable: {reason}")]
    BadSegment { name: String, reason: String },

    #[error("invalid segment name '{0}'")]
    InvalidName(String),

    /// Extending the break would pass the end of the segment.
    #[error("segment capacity exhausted: requested {requested} B, available {available} B")]
    CapacityExhausted { requested: u64, available: u64 },

    #[error("empty key")]
    InvalidKey,

    /// Key or value longer than the u32 length prefix of a record.
    #[error("record too large: key {key} B, value {value} B")]
    RecordTooLarge { key: usize, value: usize },

    /// A block header with a non-positive or out-of-range size (heap corruption).
    #[error("corrupt block at offset {offset} (size {size})")]
    CorruptBlock { offset: u64, size: u64 },

    /// Offset passed to free/realloc/alloc_size is not a live block payload.
    #[error("offset {0} does not point at a live block")]
    InvalidOffset(u64),

    #[error("hash table is not initialized in this segment")]
    TableNotInitialized,

    #[error("hash table has no free slot on the probe path")]
    TableFull,

    #[error("segment lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShmError {
    /// Resource exhaustion is recoverable by the caller (evict, resize, retry later).
    pub fn is_capacity(&self) -> bool {
        matches!(self, ShmError::CapacityExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;
