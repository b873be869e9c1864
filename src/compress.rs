use std::borrow::Cow;
use std::io;

use crate::crc;
use crate::error::Warning;
use crate::writer::Options;

/// Compression method ids as written to the method field of each record.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Method {
    #[default]
    Store = 0,
    Deflate = 8,
}

impl Method {
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Returns `None` for methods this crate cannot read.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Method::Store),
            8 => Some(Method::Deflate),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Store => "store",
            Method::Deflate => "deflate",
        }
    }
}

/// How the selector may pick a method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MethodPolicy {
    /// Deflate when it is strictly smaller, store otherwise.
    #[default]
    Auto,
    /// Never compress.
    Store,
}

/// An entry after method selection, ready to be laid out.
#[derive(Clone, Debug)]
pub struct CompressedEntry<'a> {
    pub name: &'a str,
    pub raw: &'a [u8],
    pub stored: Cow<'a, [u8]>,
    pub method: Method,
    pub crc32: u32,
}

impl CompressedEntry<'_> {
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub fn stored_len(&self) -> usize {
        self.stored.len()
    }
}

/// Selects the smaller of the stored and raw-deflated forms of `data`.
///
/// The returned warning is set when deflate could not run, in which case the
/// entry is stored.
pub fn select<'a>(
    name: &'a str,
    data: &'a [u8],
    options: &Options,
) -> (CompressedEntry<'a>, Option<Warning>) {
    let crc32 = crc::checksum(data);
    let stored = |warning: Option<Warning>| {
        (
            CompressedEntry {
                name,
                raw: data,
                stored: Cow::Borrowed(data),
                method: Method::Store,
                crc32,
            },
            warning,
        )
    };

    // Nothing is shorter than an empty payload
    if options.method == MethodPolicy::Store || data.is_empty() {
        return stored(None);
    }

    match deflate_raw(data, options.level) {
        Ok(deflated) if prefer_deflate(data.len(), deflated.len()) => (
            CompressedEntry {
                name,
                raw: data,
                stored: Cow::Owned(deflated),
                method: Method::Deflate,
                crc32,
            },
            None,
        ),
        Ok(_) => stored(None),
        Err(e) => stored(Some(Warning::CompressorUnavailable {
            reason: e.to_string(),
        })),
    }
}

/// Equal lengths keep the entry stored.
fn prefer_deflate(raw_len: usize, deflated_len: usize) -> bool {
    deflated_len < raw_len
}

#[cfg(feature = "deflate")]
fn deflate_raw(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(data.len() / 2 + 16),
        Compression::new(level.min(9)),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(not(feature = "deflate"))]
fn deflate_raw(_data: &[u8], _level: u32) -> io::Result<Vec<u8>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "built without the deflate feature",
    ))
}

/// Deflate cannot expand input by more than this factor.
#[cfg(feature = "deflate")]
const MAX_INFLATE_RATIO: usize = 1032;

/// Inflates a raw deflate stream, stopping one byte past `expected_len`.
///
/// A result longer than `expected_len` means the declared size is wrong;
/// callers compare lengths to detect it.
#[cfg(feature = "deflate")]
pub(crate) fn inflate_raw(data: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    let capacity = expected_len.min(data.len().saturating_mul(MAX_INFLATE_RATIO));
    let mut out = Vec::with_capacity(capacity);
    DeflateDecoder::new(data)
        .take(expected_len as u64 + 1)
        .read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(not(feature = "deflate"))]
pub(crate) fn inflate_raw(_data: &[u8], _expected_len: usize) -> io::Result<Vec<u8>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "built without the deflate feature",
    ))
}
