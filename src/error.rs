use std::io;

use thiserror::Error;

/// Errors produced while building or reading an archive.
///
/// Building never returns a partial archive: any of the build-time variants
/// aborts the whole call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("too many entries: {count} exceeds the 65535 entry limit")]
    TooManyEntries { count: usize },
    #[error("entry '{name}' does not fit in a 32-bit archive")]
    EntryTooLarge { name: String },
    #[error("invalid entry name '{name}': {reason}")]
    InvalidEntryName { name: String, reason: &'static str },
    #[error("invalid archive: {0}")]
    InvalidArchive(&'static str),
    #[error("unsupported archive: {0}")]
    Unsupported(&'static str),
    #[error("crc32 mismatch for '{name}': expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    #[error("entry '{0}' not found in archive")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal conditions reported next to a valid archive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    /// Deflate could not be used, every affected entry was stored as-is.
    #[error("deflate unavailable, storing entries uncompressed ({reason})")]
    CompressorUnavailable { reason: String },
}
