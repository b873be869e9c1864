use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use chrono::NaiveDateTime;
use crc32fast::Hasher;
use memmap2::Mmap;
use zerocopy::FromBytes;

use crate::compress::{self, Method};
use crate::crc;
use crate::entry::{CentralRecord, EndOfCentralDirectory, LocalRecord};
use crate::error::{Error, Result};
use crate::timestamp::DosDateTime;
use crate::{
    CENTRAL_RECORD_SIZE, CENTRAL_SIGNATURE, EOCD_SIGNATURE, EOCD_SIZE, LOCAL_RECORD_SIZE,
    LOCAL_SIGNATURE,
};

const MAX_COMMENT_LEN: usize = u16::MAX as usize;
const FLAG_ENCRYPTED: u16 = 1;

/// Central directory metadata for one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub method: Method,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    /// Offset of the local header from the start of the archive.
    pub offset: u32,
    pub stamp: DosDateTime,
    data: Range<usize>,
}

impl EntryInfo {
    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.stamp.decode()
    }
}

/// A parsed archive borrowing its bytes.
///
/// Reads classic single-disk archives using the store and deflate methods.
///
/// # Example
///
/// ```
/// use packzip::{Archive, Entry, assemble};
///
/// let zip = assemble(&[Entry::new("a.txt", "hello")])?.bytes;
/// let archive = Archive::parse(&zip)?;
/// assert_eq!(archive.read("a.txt")?.as_ref(), b"hello");
/// # Ok::<(), packzip::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Archive<'a> {
    bytes: &'a [u8],
    entries: Vec<EntryInfo>,
    central_dir_offset: usize,
}

impl<'a> Archive<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let eocd_pos =
            find_eocd(bytes).ok_or(Error::InvalidArchive("end of central directory not found"))?;
        let eocd = EndOfCentralDirectory::read_from_bytes(&bytes[eocd_pos..eocd_pos + EOCD_SIZE])
            .map_err(|_| Error::InvalidArchive("truncated end of central directory"))?;

        if eocd.is_multi_disk() {
            return Err(Error::Unsupported("multi-disk archives"));
        }
        if eocd.central_dir_offset() == u32::MAX || eocd.central_dir_size() == u32::MAX {
            return Err(Error::Unsupported("zip64 archives"));
        }

        let start = eocd.central_dir_offset() as usize;
        let end = start + eocd.central_dir_size() as usize;
        if end > eocd_pos {
            return Err(Error::InvalidArchive("central directory out of range"));
        }

        let mut entries = Vec::with_capacity(usize::from(eocd.entries()));
        let mut cursor = start;
        for _ in 0..eocd.entries() {
            let record = bytes
                .get(cursor..cursor + CENTRAL_RECORD_SIZE)
                .and_then(|s| CentralRecord::read_from_bytes(s).ok())
                .ok_or(Error::InvalidArchive("truncated central directory"))?;
            if record.signature() != CENTRAL_SIGNATURE {
                return Err(Error::InvalidArchive("invalid central directory signature"));
            }

            let name_start = cursor + CENTRAL_RECORD_SIZE;
            let name = bytes
                .get(name_start..name_start + record.name_len())
                .ok_or(Error::InvalidArchive("entry name out of range"))?;
            let name = String::from_utf8(name.to_vec())
                .map_err(|_| Error::InvalidArchive("entry name is not utf-8"))?;

            if record.flags() & FLAG_ENCRYPTED != 0 {
                return Err(Error::Unsupported("encrypted entries"));
            }
            let method = Method::from_u16(record.method())
                .ok_or(Error::Unsupported("compression method"))?;

            let data = local_data_range(bytes, &record, start)?;
            entries.push(EntryInfo {
                name,
                method,
                crc32: record.crc32(),
                compressed_size: record.compressed_size(),
                uncompressed_size: record.uncompressed_size(),
                offset: record.offset(),
                stamp: record.stamp(),
                data,
            });

            cursor = name_start + record.variable_len();
        }

        if cursor != end {
            return Err(Error::InvalidArchive("central directory size mismatch"));
        }

        Ok(Self {
            bytes,
            entries,
            central_dir_offset: start,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Absolute offset of the first central directory record.
    pub fn central_dir_offset(&self) -> usize {
        self.central_dir_offset
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Reads an entry by name, verifying its size and CRC-32.
    ///
    /// Stored entries are borrowed from the archive bytes.
    pub fn read(&self, name: &str) -> Result<Cow<'a, [u8]>> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.read_at(index)
    }

    pub fn read_at(&self, index: usize) -> Result<Cow<'a, [u8]>> {
        let info = self
            .entries
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("#{index}")))?;
        let raw = &self.bytes[info.data.clone()];

        let data = match info.method {
            Method::Store => Cow::Borrowed(raw),
            Method::Deflate => Cow::Owned(
                compress::inflate_raw(raw, info.uncompressed_size as usize)
                    .map_err(inflate_error)?,
            ),
        };

        if data.len() != info.uncompressed_size as usize {
            return Err(Error::InvalidArchive("uncompressed size mismatch"));
        }

        let actual = crc::checksum(&data);
        if actual != info.crc32 {
            return Err(Error::ChecksumMismatch {
                name: info.name.clone(),
                expected: info.crc32,
                actual,
            });
        }

        Ok(data)
    }

    /// Reads every entry, stopping at the first failure.
    pub fn verify(&self) -> Result<()> {
        for index in 0..self.entries.len() {
            self.read_at(index)?;
        }
        Ok(())
    }

    /// Returns a streaming reader for an entry.
    ///
    /// Call [`EntryReader::verify_crc32()`] after reading to check integrity.
    pub fn reader(&self, name: &str) -> Result<EntryReader<'a>> {
        let info = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let raw = &self.bytes[info.data.clone()];

        let decoder = match info.method {
            Method::Store => Decoder::Stored(io::Cursor::new(raw)),
            #[cfg(feature = "deflate")]
            Method::Deflate => Decoder::Deflate(flate2::read::DeflateDecoder::new(raw)),
            #[cfg(not(feature = "deflate"))]
            Method::Deflate => {
                return Err(Error::Unsupported(
                    "deflate entries in a build without the deflate feature",
                ));
            }
        };

        Ok(EntryReader {
            name: info.name.clone(),
            decoder,
            crc32_hasher: Hasher::new(),
            expected_crc32: info.crc32,
        })
    }
}

fn inflate_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::Unsupported {
        Error::Unsupported("deflate entries in a build without the deflate feature")
    } else {
        Error::InvalidArchive("corrupt deflate stream")
    }
}

/// Locates an entry's data through its local header.
fn local_data_range(
    bytes: &[u8],
    record: &CentralRecord,
    central_start: usize,
) -> Result<Range<usize>> {
    let offset = record.offset() as usize;
    let local = bytes
        .get(offset..offset + LOCAL_RECORD_SIZE)
        .and_then(|s| LocalRecord::read_from_bytes(s).ok())
        .ok_or(Error::InvalidArchive("local header out of range"))?;
    if local.signature() != LOCAL_SIGNATURE {
        return Err(Error::InvalidArchive("invalid local header signature"));
    }

    let start = offset + LOCAL_RECORD_SIZE + local.name_len() + local.extra_len();
    let end = start + record.compressed_size() as usize;
    if end > central_start {
        return Err(Error::InvalidArchive("entry data out of range"));
    }
    Ok(start..end)
}

/// Scans backwards for the end record, allowing for a trailing comment.
fn find_eocd(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < EOCD_SIZE {
        return None;
    }

    let last = bytes.len() - EOCD_SIZE;
    let first = last.saturating_sub(MAX_COMMENT_LEN);
    (first..=last).rev().find(|&pos| {
        bytes[pos..pos + 4] == EOCD_SIGNATURE.to_le_bytes()
            && EndOfCentralDirectory::read_from_bytes(&bytes[pos..pos + EOCD_SIZE])
                .is_ok_and(|eocd| pos + EOCD_SIZE + eocd.comment_len() == bytes.len())
    })
}

enum Decoder<'a> {
    #[cfg(feature = "deflate")]
    Deflate(flate2::read::DeflateDecoder<&'a [u8]>),
    Stored(io::Cursor<&'a [u8]>),
}

/// A streaming reader for one archive entry.
///
/// Decompresses deflated entries on the fly and tracks the CRC-32 of the
/// bytes handed out.
///
/// # Example
///
/// ```
/// # use packzip::{Archive, Entry, assemble};
/// # let zip = assemble(&[Entry::new("file.txt", "data")])?.bytes;
/// let archive = Archive::parse(&zip)?;
/// let mut reader = archive.reader("file.txt")?;
/// std::io::copy(&mut reader, &mut std::io::sink())?;
/// reader.verify_crc32()?;
/// # Ok::<(), packzip::Error>(())
/// ```
pub struct EntryReader<'a> {
    name: String,
    decoder: Decoder<'a>,
    crc32_hasher: Hasher,
    expected_crc32: u32,
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.decoder {
            #[cfg(feature = "deflate")]
            Decoder::Deflate(x) => x.read(buf)?,
            Decoder::Stored(x) => x.read(buf)?,
        };

        if n > 0 {
            self.crc32_hasher.update(&buf[..n]);
        }

        Ok(n)
    }
}

// Seeking is only possible on stored entries, and seeking invalidates the
// running checksum.
impl Seek for EntryReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.decoder {
            #[cfg(feature = "deflate")]
            Decoder::Deflate(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "seeking not supported on deflated entries",
            )),
            Decoder::Stored(x) => x.seek(pos),
        }
    }
}

impl EntryReader<'_> {
    /// Verifies the CRC-32 of the data read so far.
    ///
    /// Should be called after reading all data.
    pub fn verify_crc32(&self) -> Result<()> {
        let actual = self.crc32_hasher.clone().finalize();
        if actual != self.expected_crc32 {
            return Err(Error::ChecksumMismatch {
                name: self.name.clone(),
                expected: self.expected_crc32,
                actual,
            });
        }
        Ok(())
    }
}

/// An archive file mapped into memory.
pub struct ArchiveFile {
    mmap: Mmap,
}

impl ArchiveFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // The mapping is read-only; callers must not truncate the file while it is open
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn archive(&self) -> Result<Archive<'_>> {
        Archive::parse(&self.mmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Options, assemble_with};
    use crate::{Entry, MethodPolicy};

    fn build(entries: &[Entry]) -> Vec<u8> {
        let options = Options {
            timestamp: Some(DosDateTime::MIN),
            ..Options::default()
        };
        assemble_with(entries, &options).unwrap().bytes
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            Archive::parse(b"not a zip file at all, clearly"),
            Err(Error::InvalidArchive(_))
        ));
        assert!(matches!(Archive::parse(b""), Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn test_trailing_comment() {
        let mut zip = build(&[Entry::new("a.txt", "hello")]);
        let comment = b"built by hand";
        let len = zip.len();
        zip[len - 2..].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        zip.extend_from_slice(comment);

        let archive = Archive::parse(&zip).unwrap();
        assert_eq!(archive.read("a.txt").unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_detects_corruption() {
        let mut zip = build(&[Entry::new("a.txt", "hello")]);
        // The payload starts right after the 30-byte header and 5-byte name
        zip[LOCAL_RECORD_SIZE + 5] ^= 0xFF;

        let archive = Archive::parse(&zip).unwrap();
        assert!(matches!(
            archive.read("a.txt"),
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(archive.verify().is_err());
    }

    #[test]
    fn test_unknown_method() {
        let mut zip = build(&[Entry::new("a.txt", "hello")]);
        let central = Archive::parse(&zip).unwrap().central_dir_offset();
        zip[central + 10..central + 12].copy_from_slice(&12u16.to_le_bytes());
        assert!(matches!(
            Archive::parse(&zip),
            Err(Error::Unsupported(_))
        ));
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_understated_size_is_rejected() {
        let zeros = vec![0u8; 1 << 20];
        let mut zip = build(&[Entry::new("z", zeros)]);
        let central = {
            let archive = Archive::parse(&zip).unwrap();
            assert_eq!(archive.entries()[0].method, Method::Deflate);
            archive.central_dir_offset()
        };
        zip[central + 24..central + 28].copy_from_slice(&10u32.to_le_bytes());

        let archive = Archive::parse(&zip).unwrap();
        assert_eq!(archive.entries()[0].uncompressed_size, 10);
        assert!(matches!(
            archive.read("z"),
            Err(Error::InvalidArchive("uncompressed size mismatch"))
        ));
        assert!(archive.verify().is_err());
    }

    #[test]
    fn test_truncated() {
        let zip = build(&[Entry::new("a.txt", "hello"), Entry::new("b.txt", "world")]);
        let cut = &zip[..zip.len() - 30];
        assert!(Archive::parse(cut).is_err());
    }

    #[test]
    fn test_missing_entry() {
        let zip = build(&[Entry::new("a.txt", "hello")]);
        let archive = Archive::parse(&zip).unwrap();
        assert!(matches!(archive.read("b.txt"), Err(Error::NotFound(_))));
        assert!(matches!(archive.read_at(3), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_streaming_reader_matches_read() {
        let text = b"streamed through the entry reader ".repeat(50);
        let entries = [Entry::new("big.txt", text.clone()), Entry::new("small", "x")];
        let zip = build(&entries);
        let archive = Archive::parse(&zip).unwrap();

        for entry in &entries {
            let mut reader = archive.reader(&entry.name).unwrap();
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            reader.verify_crc32().unwrap();
            assert_eq!(out, entry.data);
        }
    }

    #[test]
    fn test_stored_reader_seeks() {
        let options = Options {
            method: MethodPolicy::Store,
            timestamp: Some(DosDateTime::MIN),
            ..Options::default()
        };
        let zip = assemble_with(&[Entry::new("a.txt", "0123456789")], &options)
            .unwrap()
            .bytes;
        let archive = Archive::parse(&zip).unwrap();
        let mut reader = archive.reader("a.txt").unwrap();
        reader.seek(SeekFrom::Start(6)).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "6789");
    }

    #[test]
    fn test_archive_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.zip");
        std::fs::write(&path, build(&[Entry::new("dir/b.txt", "")])).unwrap();

        let file = ArchiveFile::open(&path).unwrap();
        assert_eq!(file.bytes(), std::fs::read(&path).unwrap());
        let archive = file.archive().unwrap();
        assert_eq!(archive.names().collect::<Vec<_>>(), ["dir/b.txt"]);
        assert!(archive.read("dir/b.txt").unwrap().is_empty());
        assert_eq!(
            archive.entries()[0].modified(),
            DosDateTime::MIN.decode()
        );
    }
}
