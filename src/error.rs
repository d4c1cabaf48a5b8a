//! Error types for volume packing operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when splitting and encrypting archives onto volumes, along
//! with a convenient [`Result<T>`] type alias.
//!
//! # Failure Policy
//!
//! Not every error ends a packing run. The driver distinguishes three classes:
//!
//! | Class | Variants | Effect on the run |
//! |-------|----------|-------------------|
//! | Fatal | [`VolumeCreate`][Error::VolumeCreate], [`InvalidLimits`][Error::InvalidLimits] | Run aborts, `Err` is returned |
//! | Per part | [`Extraction`][Error::Extraction], [`DestinationExists`][Error::DestinationExists], [`Passphrase`][Error::Passphrase] | Part is recorded as failed, packing continues |
//! | Per file | [`SizeProbe`][Error::SizeProbe] | File is skipped, packing continues |
//!
//! Use [`Error::is_fatal`] to tell them apart:
//!
//! ```rust
//! use offsite::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     if error.is_fatal() {
//!         "run aborted"
//!     } else {
//!         "recorded, run continued"
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

/// The main error type for packing operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred outside of a more specific context.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A volume's output directory could not be created.
    ///
    /// This is fatal: without the directory no later part can be placed, and
    /// the capacity accounting for every subsequent part would be wrong.
    #[error("cannot create directory for volume {volume} at {}: {source}", path.display())]
    VolumeCreate {
        /// The volume number that was being opened.
        volume: u32,
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
        /// Everything done before the abort, attached by
        /// [`Packer::pack`](crate::Packer::pack). Parts listed here were
        /// written and are kept.
        report: Option<Box<crate::pack::PackReport>>,
    },

    /// Extracting or encrypting a byte range failed.
    ///
    /// The run continues with the next part.
    #[error("{}", ExtractionDisplay { file, offset: *offset, length: *length, reason })]
    Extraction {
        /// The source archive.
        file: PathBuf,
        /// Byte offset of the range within the source.
        offset: u64,
        /// Length of the range in bytes, `None` when the range runs to EOF.
        length: Option<u64>,
        /// What went wrong.
        reason: String,
    },

    /// The size of a source file could not be determined.
    ///
    /// The file is skipped.
    #[error("cannot determine size of {}: {source}", path.display())]
    SizeProbe {
        /// The source file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A part's destination already exists or was already claimed by another
    /// part in the same volume.
    #[error("destination already exists: {}", path.display())]
    DestinationExists {
        /// The conflicting destination path.
        path: PathBuf,
    },

    /// The volume limits are inconsistent.
    #[error("invalid volume limits: {0}")]
    InvalidLimits(String),

    /// The passphrase could not be read from its source.
    #[error("passphrase unavailable: {0}")]
    Passphrase(String),

    /// An archive file name does not follow `<fs>.<level>.<timestamp>.tar.bz2`.
    #[error("invalid archive name: {0}")]
    InvalidArchiveName(String),

    /// A cryptographic operation failed.
    #[error("cryptographic error: {0}")]
    CryptoError(String),

    /// A configured resource limit was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

/// Helper struct for formatting Extraction error messages.
struct ExtractionDisplay<'a> {
    file: &'a PathBuf,
    offset: u64,
    length: Option<u64>,
    reason: &'a str,
}

impl std::fmt::Display for ExtractionDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to encrypt {} ", self.file.display())?;
        match self.length {
            Some(len) => write!(
                f,
                "bytes {}..{} (offset {}, {} bytes)",
                self.offset,
                self.offset + len,
                self.offset,
                len
            )?,
            None => write!(f, "bytes {}..EOF (offset {})", self.offset, self.offset)?,
        }
        write!(f, ": {}", self.reason)
    }
}

impl Error {
    /// Returns `true` if this error aborts a packing run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::VolumeCreate { .. } | Error::InvalidLimits(_))
    }

    /// Returns the source or destination path associated with this error, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Error::VolumeCreate { path, .. } => Some(path),
            Error::Extraction { file, .. } => Some(file),
            Error::SizeProbe { path, .. } => Some(path),
            Error::DestinationExists { path } => Some(path),
            _ => None,
        }
    }

    /// Returns the report of a run that was aborted by this error.
    pub fn partial_report(&self) -> Option<&crate::pack::PackReport> {
        match self {
            Error::VolumeCreate { report, .. } => report.as_deref(),
            _ => None,
        }
    }

    /// Creates an Extraction error.
    pub fn extraction(
        file: impl Into<PathBuf>,
        offset: u64,
        length: Option<u64>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Extraction {
            file: file.into(),
            offset,
            length,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for packing operations.
pub type Result<T> = std::result::Result<T, Error>;
