//! Builds PKZIP archives in memory.
//!
//! Entries go in as an ordered list of names and byte payloads, and a single
//! buffer comes out that any standard unzip tool can extract. Each entry is
//! stored or raw-deflated, whichever is smaller, and carries a CRC-32 of its
//! original bytes. Only the classic format is written: at most 65535 entries
//! and 32-bit sizes and offsets.
//!
//! ```
//! use packzip::{Archive, Entry, assemble};
//!
//! let entries = [Entry::new("a.txt", "hello"), Entry::new("dir/b.txt", "")];
//! let zip = assemble(&entries)?.bytes;
//!
//! let archive = Archive::parse(&zip)?;
//! assert_eq!(archive.len(), 2);
//! assert_eq!(archive.read("a.txt")?.as_ref(), b"hello");
//! # Ok::<(), packzip::Error>(())
//! ```

pub mod compress;
pub mod crc;
pub mod entry;
pub mod error;
pub(crate) mod ffi;
pub mod reader;
pub mod timestamp;
pub mod writer;

pub use compress::{CompressedEntry, Method, MethodPolicy};
pub use crc::checksum;
pub use entry::Entry;
pub use error::{Error, Result, Warning};
pub use reader::{Archive, ArchiveFile, EntryInfo, EntryReader};
pub use timestamp::DosDateTime;
pub use writer::{Assembled, Options, ZipBuilder, assemble, assemble_with};

pub(crate) const LOCAL_SIGNATURE: u32 = 0x0403_4b50;
pub(crate) const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
pub(crate) const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// 2.0: deflate, no extensions.
pub(crate) const VERSION_NEEDED: u16 = 20;
pub(crate) const VERSION_MADE_BY: u16 = 20;

pub const LOCAL_RECORD_SIZE: usize = std::mem::size_of::<entry::LocalRecord>();
pub const CENTRAL_RECORD_SIZE: usize = std::mem::size_of::<entry::CentralRecord>();
pub const EOCD_SIZE: usize = std::mem::size_of::<entry::EndOfCentralDirectory>();

/// Largest entry count the 16-bit directory fields can hold.
pub const MAX_ENTRIES: usize = u16::MAX as usize;
