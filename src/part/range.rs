//! Byte-range extraction from source archives.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Read buffer for source archives.
const READ_BUFFER: usize = 256 * 1024;

/// A block-addressed byte range of a source file and where its encrypted
/// form goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// The source archive.
    pub source: PathBuf,
    /// Destination of the encrypted part.
    pub destination: PathBuf,
    /// Block size the offsets are expressed in.
    pub block_size: u64,
    /// Start of the range in blocks.
    pub offset_blocks: u64,
    /// Length of the range in blocks, 0 for "to end of file".
    pub copy_blocks: u64,
}

impl RangeRequest {
    /// Byte offset of the range.
    pub fn offset(&self) -> u64 {
        self.offset_blocks * self.block_size
    }

    /// Byte length of the range, `None` if it runs to end of file.
    pub fn length(&self) -> Option<u64> {
        (self.copy_blocks > 0).then(|| self.copy_blocks * self.block_size)
    }

    /// Wraps an error from this range with the source, offset and length.
    pub fn error(&self, reason: impl std::fmt::Display) -> Error {
        Error::extraction(
            self.source.clone(),
            self.offset(),
            self.length(),
            reason.to_string(),
        )
    }

    /// Opens the source positioned at the start of the range.
    pub fn open(&self) -> Result<RangeReader> {
        let file = File::open(&self.source).map_err(|e| self.error(e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER, file);
        reader
            .seek(SeekFrom::Start(self.offset()))
            .map_err(|e| self.error(e))?;

        let limit = self.length().unwrap_or(u64::MAX);
        Ok(RangeReader {
            inner: reader.take(limit),
            expected: self.length(),
        })
    }

    /// Sibling path the part is written to before it is renamed into place.
    pub fn partial_path(&self) -> PathBuf {
        partial_path(&self.destination)
    }
}

/// Reader over one byte range of a source file.
#[derive(Debug)]
pub struct RangeReader {
    inner: io::Take<BufReader<File>>,
    expected: Option<u64>,
}

impl RangeReader {
    /// Returns an error if a bounded range ended before its length.
    ///
    /// Call after the reader has been drained.
    pub fn check_complete(&self, copied: u64) -> io::Result<()> {
        match self.expected {
            Some(expected) if copied != expected => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {} of {} bytes", copied, expected),
            )),
            _ => Ok(()),
        }
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

/// Moves a finished part into place, removing the partial file on failure.
pub(crate) fn commit(partial: &Path, destination: &Path) -> io::Result<()> {
    if destination.exists() {
        let _ = fs::remove_file(partial);
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} appeared while encrypting", destination.display()),
        ));
    }
    fs::rename(partial, destination).inspect_err(|_| {
        let _ = fs::remove_file(partial);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(source: &Path, offset_blocks: u64, copy_blocks: u64) -> RangeRequest {
        RangeRequest {
            source: source.to_path_buf(),
            destination: source.with_extension("gpg"),
            block_size: 10,
            offset_blocks,
            copy_blocks,
        }
    }

    fn source(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("src.bin");
        fs::write(&path, (0u8..95).collect::<Vec<_>>()).unwrap();
        path
    }

    #[test]
    fn test_bounded_range() {
        let dir = TempDir::new().unwrap();
        let req = request(&source(&dir), 2, 3);
        assert_eq!(req.offset(), 20);
        assert_eq!(req.length(), Some(30));

        let mut reader = req.open().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, (20u8..50).collect::<Vec<_>>());
        reader.check_complete(out.len() as u64).unwrap();
    }

    #[test]
    fn test_range_to_eof() {
        let dir = TempDir::new().unwrap();
        let req = request(&source(&dir), 9, 0);
        assert_eq!(req.length(), None);

        let mut out = Vec::new();
        req.open().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, (90u8..95).collect::<Vec<_>>());
    }

    #[test]
    fn test_short_source_detected() {
        let dir = TempDir::new().unwrap();
        let req = request(&source(&dir), 8, 2);
        let mut reader = req.open().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 15);
        assert!(reader.check_complete(15).is_err());
    }

    #[test]
    fn test_missing_source_is_extraction_error() {
        let req = request(Path::new("/nonexistent/offsite/src"), 1, 1);
        let err = req.open().unwrap_err();
        assert!(matches!(err, Error::Extraction { offset: 10, .. }));
    }

    #[test]
    fn test_partial_path_is_sibling() {
        let req = request(Path::new("/w/1/a.tar.bz2"), 0, 0);
        assert_eq!(req.partial_path(), PathBuf::from("/w/1/a.tar.gpg.partial"));
    }

    #[test]
    fn test_commit_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let partial = dir.path().join("p.partial");
        let dest = dir.path().join("p");
        fs::write(&partial, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        assert!(commit(&partial, &dest).is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert!(!partial.exists());
    }
}
