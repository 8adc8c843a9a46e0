//! Where decoded part bodies live: in memory or in spooled temporary files.

use crate::constants;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Decides whether a part body is held in memory or spooled to a temporary file.
///
/// Parts whose content type is `multipart/*` always stay in memory so they can be
/// decoded recursively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePolicy {
    /// File uploads (parts carrying a `filename`) larger than the given number of
    /// bytes are spooled; everything else stays in memory.
    Threshold(u64),
    /// Every part is kept in memory.
    InMemory,
    /// Every part is spooled, regardless of size.
    Spooled,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        StoragePolicy::Threshold(constants::DEFAULT_MEMORY_THRESHOLD)
    }
}

impl StoragePolicy {
    pub(crate) fn should_spool(&self, file_like: bool, size: u64) -> bool {
        match *self {
            StoragePolicy::Threshold(limit) => file_like && size > limit,
            StoragePolicy::InMemory => false,
            StoragePolicy::Spooled => true,
        }
    }
}

/// A part body written to a temporary file.
///
/// The file is deleted when this value is dropped.
pub struct SpooledFile {
    file: BufWriter<NamedTempFile>,
    len: u64,
}

impl SpooledFile {
    pub(crate) fn create(dir: Option<&Path>) -> io::Result<SpooledFile> {
        let file = match dir {
            Some(dir) => NamedTempFile::with_prefix_in(constants::SPOOL_FILE_PREFIX, dir)?,
            None => NamedTempFile::with_prefix(constants::SPOOL_FILE_PREFIX)?,
        };

        Ok(SpooledFile {
            file: BufWriter::new(file),
            len: 0,
        })
    }

    pub(crate) fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Number of bytes stored.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the temporary file. Valid as long as this value is alive.
    pub fn path(&self) -> &Path {
        self.file.get_ref().path()
    }

    /// Opens an independent handle positioned at the start of the content.
    ///
    /// Only bytes flushed so far are visible; decoded parts are always flushed.
    pub fn reader(&self) -> io::Result<File> {
        let mut file = self.file.get_ref().reopen()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }

    /// Reads the whole content back into memory.
    pub fn read_all(&self) -> io::Result<Bytes> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.reader()?.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for SpooledFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpooledFile")
            .field("path", &self.path())
            .field("len", &self.len)
            .finish()
    }
}

/// Accumulates the body of the part currently being decoded.
#[derive(Debug)]
pub(crate) enum PartSink {
    Memory(BytesMut),
    Spooled(SpooledFile),
}

impl PartSink {
    pub fn new() -> Self {
        PartSink::Memory(BytesMut::new())
    }

    pub fn len(&self) -> u64 {
        match self {
            PartSink::Memory(buf) => buf.len() as u64,
            PartSink::Spooled(file) => file.len(),
        }
    }

    /// Appends `data`, moving the accumulated bytes to a spooled file the first
    /// time `spool` asks for it. Once spooled, a part never returns to memory.
    pub fn write(&mut self, data: &[u8], spool: bool, spool_dir: Option<&Path>) -> io::Result<()> {
        if let PartSink::Memory(buf) = self {
            if !spool {
                buf.extend_from_slice(data);
                return Ok(());
            }

            let mut file = SpooledFile::create(spool_dir)?;
            file.write_all(buf)?;
            log::debug!("spooling part body to {}", file.path().display());
            *self = PartSink::Spooled(file);
        }

        if let PartSink::Spooled(file) = self {
            file.write_all(data)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_policy() {
        let policy = StoragePolicy::Threshold(4);
        assert!(!policy.should_spool(true, 4));
        assert!(policy.should_spool(true, 5));
        assert!(!policy.should_spool(false, 1024));

        assert!(!StoragePolicy::InMemory.should_spool(true, u64::MAX));
        assert!(StoragePolicy::Spooled.should_spool(false, 0));
    }

    #[test]
    fn test_sink_spills_once() {
        let mut sink = PartSink::new();
        sink.write(b"abc", false, None).unwrap();
        assert!(matches!(sink, PartSink::Memory(_)));

        sink.write(b"def", true, None).unwrap();
        sink.write(b"ghi", false, None).unwrap();
        assert_eq!(sink.len(), 9);

        match sink {
            PartSink::Spooled(mut file) => {
                file.flush().unwrap();
                assert_eq!(file.read_all().unwrap(), Bytes::from_static(b"abcdefghi"));
            }
            PartSink::Memory(_) => panic!("sink should have been spooled"),
        }
    }

    #[test]
    fn test_spooled_writes_are_buffered_until_flush() {
        let mut file = SpooledFile::create(None).unwrap();
        for byte in b"one byte at a time" {
            file.write_all(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(file.len(), 18);
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 0);

        file.flush().unwrap();
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 18);
        assert_eq!(file.read_all().unwrap(), Bytes::from_static(b"one byte at a time"));
    }

    #[test]
    fn test_spooled_file_removed_on_drop() {
        let mut file = SpooledFile::create(None).unwrap();
        file.write_all(b"payload").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }
}
