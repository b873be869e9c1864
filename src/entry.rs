use zerocopy::{FromBytes, Immutable, IntoBytes, Unaligned};

use crate::compress::Method;
use crate::timestamp::DosDateTime;
use crate::{CENTRAL_SIGNATURE, EOCD_SIGNATURE, LOCAL_SIGNATURE, VERSION_MADE_BY, VERSION_NEEDED};

/// A named payload to place in an archive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Fields shared by the local and central record of one entry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordMeta {
    pub method: Method,
    pub stamp: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
}

// All multi-byte fields are stored little-endian. Constructors go through
// `to_le` and getters through `from_le`, so the structs can be written with
// `as_bytes()` and read with `read_from_bytes()` on any host.

/// Local file header, written immediately before the name and data.
#[repr(C, packed)]
#[derive(FromBytes, Unaligned, IntoBytes, Immutable, Clone, Copy, Debug, Default)]
pub struct LocalRecord {
    signature: u32,
    version_needed: u16,
    flags: u16,
    method: u16,
    time: u16,
    date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_len: u16,
    extra_len: u16,
}

impl LocalRecord {
    pub(crate) fn new(meta: &RecordMeta) -> Self {
        Self {
            signature: LOCAL_SIGNATURE.to_le(),
            version_needed: VERSION_NEEDED.to_le(),
            flags: 0,
            method: meta.method.id().to_le(),
            time: meta.stamp.time.to_le(),
            date: meta.stamp.date.to_le(),
            crc32: meta.crc32.to_le(),
            compressed_size: meta.compressed_size.to_le(),
            uncompressed_size: meta.uncompressed_size.to_le(),
            name_len: meta.name_len.to_le(),
            extra_len: 0,
        }
    }

    pub fn signature(&self) -> u32 {
        u32::from_le(self.signature)
    }

    pub fn method(&self) -> u16 {
        u16::from_le(self.method)
    }

    pub fn crc32(&self) -> u32 {
        u32::from_le(self.crc32)
    }

    pub fn compressed_size(&self) -> u32 {
        u32::from_le(self.compressed_size)
    }

    pub fn uncompressed_size(&self) -> u32 {
        u32::from_le(self.uncompressed_size)
    }

    pub fn name_len(&self) -> usize {
        u16::from_le(self.name_len) as usize
    }

    pub fn extra_len(&self) -> usize {
        u16::from_le(self.extra_len) as usize
    }
}

/// Central directory header, one per entry after all entry data.
#[repr(C, packed)]
#[derive(FromBytes, Unaligned, IntoBytes, Immutable, Clone, Copy, Debug, Default)]
pub struct CentralRecord {
    signature: u32,
    version_made_by: u16,
    version_needed: u16,
    flags: u16,
    method: u16,
    time: u16,
    date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_len: u16,
    extra_len: u16,
    comment_len: u16,
    disk_number: u16,
    internal_attrs: u16,
    external_attrs: u32,
    offset: u32,
}

impl CentralRecord {
    pub(crate) fn new(meta: &RecordMeta, offset: u32) -> Self {
        Self {
            signature: CENTRAL_SIGNATURE.to_le(),
            version_made_by: VERSION_MADE_BY.to_le(),
            version_needed: VERSION_NEEDED.to_le(),
            method: meta.method.id().to_le(),
            time: meta.stamp.time.to_le(),
            date: meta.stamp.date.to_le(),
            crc32: meta.crc32.to_le(),
            compressed_size: meta.compressed_size.to_le(),
            uncompressed_size: meta.uncompressed_size.to_le(),
            name_len: meta.name_len.to_le(),
            offset: offset.to_le(),
            ..Default::default()
        }
    }

    pub fn signature(&self) -> u32 {
        u32::from_le(self.signature)
    }

    pub fn flags(&self) -> u16 {
        u16::from_le(self.flags)
    }

    pub fn method(&self) -> u16 {
        u16::from_le(self.method)
    }

    pub fn stamp(&self) -> DosDateTime {
        DosDateTime {
            time: u16::from_le(self.time),
            date: u16::from_le(self.date),
        }
    }

    pub fn crc32(&self) -> u32 {
        u32::from_le(self.crc32)
    }

    pub fn compressed_size(&self) -> u32 {
        u32::from_le(self.compressed_size)
    }

    pub fn uncompressed_size(&self) -> u32 {
        u32::from_le(self.uncompressed_size)
    }

    pub fn name_len(&self) -> usize {
        u16::from_le(self.name_len) as usize
    }

    /// Length of the name, extra field and comment that follow the record.
    pub fn variable_len(&self) -> usize {
        self.name_len()
            + u16::from_le(self.extra_len) as usize
            + u16::from_le(self.comment_len) as usize
    }

    pub fn offset(&self) -> u32 {
        u32::from_le(self.offset)
    }
}

/// End of central directory record, always the last 22 bytes we write.
#[repr(C, packed)]
#[derive(FromBytes, Unaligned, IntoBytes, Immutable, Clone, Copy, Debug, Default)]
pub struct EndOfCentralDirectory {
    signature: u32,
    disk_number: u16,
    central_dir_disk: u16,
    entries_on_disk: u16,
    entries_total: u16,
    central_dir_size: u32,
    central_dir_offset: u32,
    comment_len: u16,
}

impl EndOfCentralDirectory {
    /// Single-disk archive: both entry counts carry the same value.
    pub(crate) fn new(entries: u16, central_dir_size: u32, central_dir_offset: u32) -> Self {
        Self {
            signature: EOCD_SIGNATURE.to_le(),
            entries_on_disk: entries.to_le(),
            entries_total: entries.to_le(),
            central_dir_size: central_dir_size.to_le(),
            central_dir_offset: central_dir_offset.to_le(),
            ..Default::default()
        }
    }

    pub fn signature(&self) -> u32 {
        u32::from_le(self.signature)
    }

    pub fn is_multi_disk(&self) -> bool {
        u16::from_le(self.disk_number) != 0
            || u16::from_le(self.central_dir_disk) != 0
            || u16::from_le(self.entries_on_disk) != u16::from_le(self.entries_total)
    }

    pub fn entries(&self) -> u16 {
        u16::from_le(self.entries_total)
    }

    pub fn central_dir_size(&self) -> u32 {
        u32::from_le(self.central_dir_size)
    }

    pub fn central_dir_offset(&self) -> u32 {
        u32::from_le(self.central_dir_offset)
    }

    pub fn comment_len(&self) -> usize {
        u16::from_le(self.comment_len) as usize
    }
}

const _: () = assert!(std::mem::size_of::<LocalRecord>() == 30);
const _: () = assert!(std::mem::size_of::<CentralRecord>() == 46);
const _: () = assert!(std::mem::size_of::<EndOfCentralDirectory>() == 22);
