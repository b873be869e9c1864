use std::path::Path;

use log::{debug, info, warn};
use zerocopy::IntoBytes;

use crate::compress::{self, CompressedEntry, MethodPolicy};
use crate::entry::{CentralRecord, EndOfCentralDirectory, Entry, LocalRecord, RecordMeta};
use crate::error::{Error, Result, Warning};
use crate::timestamp::DosDateTime;
use crate::{CENTRAL_RECORD_SIZE, EOCD_SIZE, LOCAL_RECORD_SIZE, MAX_ENTRIES};

/// Build settings.
#[derive(Clone, Debug)]
pub struct Options {
    /// Deflate level, 0 to 9. Higher values are clamped to 9.
    pub level: u32,
    pub method: MethodPolicy,
    /// Fixed modification time for every entry. When unset the local clock is
    /// read once per build.
    pub timestamp: Option<DosDateTime>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            level: 6,
            method: MethodPolicy::Auto,
            timestamp: None,
        }
    }
}

/// A finished archive and any non-fatal conditions met while building it.
#[derive(Clone, Debug, Default)]
pub struct Assembled {
    pub bytes: Vec<u8>,
    pub warnings: Vec<Warning>,
}

/// Builds an archive from `entries` with default options.
pub fn assemble(entries: &[Entry]) -> Result<Assembled> {
    assemble_with(entries, &Options::default())
}

/// Builds an archive from `entries`, keeping their order.
///
/// All limits are checked before the buffer is returned: on error nothing is
/// produced.
pub fn assemble_with(entries: &[Entry], options: &Options) -> Result<Assembled> {
    if entries.len() > MAX_ENTRIES {
        return Err(Error::TooManyEntries {
            count: entries.len(),
        });
    }
    let count = entries.len() as u16;

    let name_lens = entries
        .iter()
        .map(|e| validate_name(&e.name))
        .collect::<Result<Vec<u16>>>()?;

    let stamp = options.timestamp.unwrap_or_else(DosDateTime::now);
    let mut warnings: Vec<Warning> = Vec::new();
    let mut local = Vec::new();
    let mut central = Vec::with_capacity(
        entries
            .iter()
            .map(|e| CENTRAL_RECORD_SIZE + e.name.len())
            .sum::<usize>()
            + EOCD_SIZE,
    );

    for ((compressed, warning), name_len) in select_all(entries, options).into_iter().zip(name_lens)
    {
        if let Some(warning) = warning {
            // One report per build is enough, every later entry hits the same cause
            if warnings.is_empty() {
                warn!("{warning}");
                warnings.push(warning);
            }
        }

        let offset = check_fits(
            compressed.name,
            local.len(),
            compressed.raw_len(),
            compressed.stored_len(),
            central.len(),
        )?;
        let meta = RecordMeta {
            method: compressed.method,
            stamp,
            crc32: compressed.crc32,
            compressed_size: compressed.stored_len() as u32,
            uncompressed_size: compressed.raw_len() as u32,
            name_len,
        };

        local.extend_from_slice(LocalRecord::new(&meta).as_bytes());
        local.extend_from_slice(compressed.name.as_bytes());
        local.extend_from_slice(&compressed.stored);

        central.extend_from_slice(CentralRecord::new(&meta, offset).as_bytes());
        central.extend_from_slice(compressed.name.as_bytes());

        debug!(
            "{} {} {} -> {} bytes at offset {offset}",
            compressed.name,
            compressed.method.name(),
            compressed.raw_len(),
            compressed.stored_len()
        );
    }

    let central_size = central.len() as u32;
    let central_offset = local.len() as u32;
    central.extend_from_slice(
        EndOfCentralDirectory::new(count, central_size, central_offset).as_bytes(),
    );

    let mut bytes = local;
    bytes.extend_from_slice(&central);

    info!("assembled {count} entries into {} bytes", bytes.len());
    Ok(Assembled { bytes, warnings })
}

/// Checks that an entry appended after `local_len` bytes of entry data, with
/// `central_len` bytes of directory before its central record, keeps every
/// size and offset within 32 bits. Returns the entry's offset.
fn check_fits(
    name: &str,
    local_len: usize,
    raw_len: usize,
    stored_len: usize,
    central_len: usize,
) -> Result<u32> {
    let name_len = name.len() as u64;
    let end = local_len as u64 + LOCAL_RECORD_SIZE as u64 + name_len + stored_len as u64;
    let central_end = central_len as u64 + CENTRAL_RECORD_SIZE as u64 + name_len;

    let limit = u64::from(u32::MAX);
    if end > limit || central_end > limit || raw_len as u64 > limit {
        return Err(Error::EntryTooLarge {
            name: name.to_string(),
        });
    }
    Ok(local_len as u32)
}

#[cfg(not(feature = "parallel"))]
fn select_all<'a>(
    entries: &'a [Entry],
    options: &Options,
) -> Vec<(CompressedEntry<'a>, Option<Warning>)> {
    entries
        .iter()
        .map(|e| compress::select(&e.name, &e.data, options))
        .collect()
}

// Entries are compressed on the rayon pool; `collect` keeps input order.
#[cfg(feature = "parallel")]
fn select_all<'a>(
    entries: &'a [Entry],
    options: &Options,
) -> Vec<(CompressedEntry<'a>, Option<Warning>)> {
    use rayon::prelude::*;

    entries
        .par_iter()
        .map(|e| compress::select(&e.name, &e.data, options))
        .collect()
}

/// Checks a name against the record limits, returning its byte length.
pub fn validate_name(name: &str) -> Result<u16> {
    let invalid = |reason| Error::InvalidEntryName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('/') {
        return Err(invalid("name must be a relative path"));
    }
    if name.contains('\\') {
        return Err(invalid("name must use forward slashes"));
    }
    u16::try_from(name.len()).map_err(|_| invalid("name is longer than 65535 bytes"))
}

/// Collects entries in memory and assembles them into one archive.
///
/// # Example
///
/// ```no_run
/// use packzip::ZipBuilder;
///
/// let mut builder = ZipBuilder::new();
/// builder.add("a.txt", "hello");
/// builder.add_file("notes/b.md", "b.md")?;
/// builder.save("out.zip")?;
/// # Ok::<(), packzip::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct ZipBuilder {
    entries: Vec<Entry>,
    options: Options,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            entries: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Appends an entry. Names are validated when the archive is assembled.
    pub fn add(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.push(Entry::new(name, data));
    }

    /// Reads the file at `path` and appends it under `name`.
    pub fn add_file(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let data = std::fs::read(path)?;
        self.add(name, data);
        Ok(())
    }

    /// Recursively appends every file under `src_dir`.
    ///
    /// Names are the `/`-joined paths relative to `src_dir`, optionally under
    /// `prefix`. Directory entries are visited in sorted order so the same
    /// tree always yields the same archive. Returns the number of files added.
    pub fn pack(&mut self, src_dir: impl AsRef<Path>, prefix: Option<&str>) -> Result<usize> {
        let base = src_dir.as_ref();
        let prefix = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty());
        let before = self.entries.len();
        self.pack_recursive(base, base, prefix)?;
        Ok(self.entries.len() - before)
    }

    fn pack_recursive(&mut self, base: &Path, current: &Path, prefix: Option<&str>) -> Result<()> {
        let mut children = std::fs::read_dir(current)?
            .map(|entry| entry.and_then(|e| Ok((e.path(), e.file_type()?))))
            .collect::<std::io::Result<Vec<_>>>()?;
        children.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, file_type) in children {
            if file_type.is_dir() {
                self.pack_recursive(base, &path, prefix)?;
                continue;
            }
            // Links are read as files; links to directories are never followed
            if file_type.is_symlink() && path.is_dir() {
                warn!("skipping directory link '{}'", path.display());
                continue;
            }

            let relative = path
                .strip_prefix(base)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let name = match prefix {
                Some(prefix) => format!("{prefix}/{relative}"),
                None => relative,
            };
            self.add_file(name, &path)?;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Assembles the collected entries.
    pub fn finish(&self) -> Result<Assembled> {
        assemble_with(&self.entries, &self.options)
    }

    /// Assembles the collected entries and writes the archive to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<Assembled> {
        let assembled = self.finish()?;
        std::fs::write(path, &assembled.bytes)?;
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("a.txt").unwrap(), 5);
        assert_eq!(validate_name("dir/sub/b.txt").unwrap(), 13);
        for bad in ["", "/abs.txt", "dir\\b.txt"] {
            assert!(matches!(
                validate_name(bad),
                Err(Error::InvalidEntryName { .. })
            ));
        }
        let long = "n".repeat(65536);
        assert!(matches!(
            validate_name(&long),
            Err(Error::InvalidEntryName { .. })
        ));
        assert!(validate_name(&"n".repeat(65535)).is_ok());
    }

    #[test]
    fn test_invalid_name_aborts_build() {
        let entries = vec![Entry::new("ok.txt", "fine"), Entry::new("", "nameless")];
        let err = assemble(&entries).unwrap_err();
        assert!(matches!(err, Error::InvalidEntryName { .. }));
    }

    #[test]
    fn test_builder_pack_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("refs/deep")).unwrap();
        fs::write(dir.path().join("Skill.md"), "# skill").unwrap();
        fs::write(dir.path().join("refs/b.md"), "b").unwrap();
        fs::write(dir.path().join("refs/a.md"), "a").unwrap();
        fs::write(dir.path().join("refs/deep/c.txt"), "c").unwrap();

        let mut builder = ZipBuilder::new();
        let added = builder.pack(dir.path(), Some("mission/")).unwrap();
        assert_eq!(added, 4);

        let names: Vec<&str> = builder.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "mission/Skill.md",
                "mission/refs/a.md",
                "mission/refs/b.md",
                "mission/refs/deep/c.txt",
            ]
        );
        assert_eq!(builder.entries()[0].data, b"# skill");
    }

    #[test]
    fn test_check_fits_at_32_bit_limit() {
        let max = u32::MAX as usize;
        // "a.txt" adds 35 bytes of local header and name, 51 of central record
        assert_eq!(check_fits("a.txt", max - 45, 10, 10, 0).unwrap(), (max - 45) as u32);
        assert!(matches!(
            check_fits("a.txt", max - 45, 11, 11, 0),
            Err(Error::EntryTooLarge { ref name }) if name == "a.txt"
        ));

        assert!(check_fits("a.txt", 0, 0, 0, max - 51).is_ok());
        assert!(matches!(
            check_fits("a.txt", 0, 0, 0, max - 50),
            Err(Error::EntryTooLarge { .. })
        ));

        assert!(check_fits("a.txt", 0, max, 100, 0).is_ok());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_check_fits_rejects_large_raw_size() {
        let over = u32::MAX as usize + 1;
        assert!(matches!(
            check_fits("big.bin", 0, over, 1024, 0),
            Err(Error::EntryTooLarge { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_skips_directory_links() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), "a").unwrap();
        fs::write(dir.path().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt"))
            .unwrap();

        let mut builder = ZipBuilder::new();
        assert_eq!(builder.pack(dir.path(), None).unwrap(), 3);
        let names: Vec<&str> = builder.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["link.txt", "sub/a.txt", "target.txt"]);
        assert_eq!(builder.entries()[0].data, b"t");
    }

    #[test]
    fn test_builder_save_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zip");

        let mut builder = ZipBuilder::with_options(Options {
            timestamp: Some(DosDateTime::MIN),
            ..Options::default()
        });
        builder.add("a.txt", "hello");
        let assembled = builder.save(&path).unwrap();

        assert_eq!(fs::read(&path).unwrap(), assembled.bytes);
        assert_eq!(builder.len(), 1);
        assert!(!builder.is_empty());
    }

    #[test]
    fn test_add_file_missing_is_io_error() {
        let mut builder = ZipBuilder::new();
        let err = builder
            .add_file("x", "/definitely/not/here/x.bin")
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(builder.is_empty());
    }
}
