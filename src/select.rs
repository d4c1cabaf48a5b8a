//! Selection of the archives that go offsite.
//!
//! Backup archives are named `<filesystem-id>.<level>.<timestamp>.tar.bz2`.
//! For every filesystem the latest full (level 0) archive is selected, plus
//! the latest level 1 archive when it is newer than that full archive.
//! Newer means a strictly later modification time.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Suffix shared by all backup archives.
pub const ARCHIVE_SUFFIX: &str = ".tar.bz2";

/// The parsed name of a backup archive.
///
/// # Example
///
/// ```rust
/// use offsite::select::ArchiveName;
///
/// let name = ArchiveName::parse("srv.data.1.20240108T0300.tar.bz2").unwrap();
/// assert_eq!(name.filesystem, "srv.data");
/// assert_eq!(name.level, 1);
/// assert_eq!(name.timestamp, "20240108T0300");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    /// Filesystem identifier. May contain dots.
    pub filesystem: String,
    /// Backup level, 0 for a full backup.
    pub level: u32,
    /// Opaque timestamp token.
    pub timestamp: String,
}

impl ArchiveName {
    /// Parses an archive file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchiveName`] if the name does not follow
    /// `<filesystem-id>.<level>.<timestamp>.tar.bz2`.
    pub fn parse(file_name: &str) -> Result<Self> {
        let invalid = || Error::InvalidArchiveName(file_name.to_string());

        let stem = file_name.strip_suffix(ARCHIVE_SUFFIX).ok_or_else(invalid)?;
        let mut fields = stem.rsplitn(3, '.');
        let timestamp = fields.next().ok_or_else(invalid)?;
        let level = fields.next().ok_or_else(invalid)?;
        let filesystem = fields.next().ok_or_else(invalid)?;

        if filesystem.is_empty() || timestamp.is_empty() || level.is_empty() {
            return Err(invalid());
        }
        if !level.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let level = level.parse().map_err(|_| invalid())?;

        Ok(Self {
            filesystem: filesystem.to_string(),
            level,
            timestamp: timestamp.to_string(),
        })
    }
}

/// An archive picked for offsite transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedArchive {
    /// Full path of the archive.
    pub path: PathBuf,
    /// Its parsed name.
    pub name: ArchiveName,
    /// Modification time.
    pub modified: FileTime,
}

/// Orders archives by modification time, then by file name.
fn newer(a: &SelectedArchive, b: &SelectedArchive) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
}

#[derive(Default)]
struct Candidates {
    full: Option<SelectedArchive>,
    incremental: Option<SelectedArchive>,
}

impl Candidates {
    fn offer(slot: &mut Option<SelectedArchive>, archive: SelectedArchive) {
        match slot {
            Some(current) if newer(current, &archive) != Ordering::Less => {}
            _ => *slot = Some(archive),
        }
    }
}

/// Selects the archives of `dir` that go offsite.
///
/// Only the directory itself is scanned. Files with names that are not
/// archive names are ignored. The result is ordered by filesystem id, each
/// full archive directly followed by its incremental, and can be passed to
/// [`Packer::pack`](crate::Packer::pack) as is.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn select_offsite(dir: impl AsRef<Path>) -> Result<Vec<SelectedArchive>> {
    let dir = dir.as_ref();
    let mut by_filesystem: BTreeMap<String, Candidates> = BTreeMap::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            Error::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("cannot scan {}", dir.display()))
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let name = match ArchiveName::parse(&file_name) {
            Ok(name) => name,
            Err(_) => {
                log::debug!("Ignoring {}: not a backup archive name", entry.path().display());
                continue;
            }
        };
        if name.level > 1 {
            log::debug!("Ignoring level {} archive {}", name.level, file_name);
            continue;
        }

        let metadata = entry.metadata().map_err(|e| {
            Error::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("cannot stat {}", entry.path().display()))
            }))
        })?;
        let archive = SelectedArchive {
            path: entry.path().to_path_buf(),
            modified: FileTime::from_last_modification_time(&metadata),
            name,
        };

        let candidates = by_filesystem
            .entry(archive.name.filesystem.clone())
            .or_default();
        if archive.name.level == 0 {
            Candidates::offer(&mut candidates.full, archive);
        } else {
            Candidates::offer(&mut candidates.incremental, archive);
        }
    }

    let mut selected = Vec::new();
    for (filesystem, candidates) in by_filesystem {
        let Some(full) = candidates.full else {
            log::warn!(
                "No full backup for filesystem {}, its incremental archives are not selected",
                filesystem
            );
            continue;
        };
        let incremental = candidates
            .incremental
            .filter(|inc| inc.modified > full.modified);

        log::info!("Selected {}", full.path.display());
        selected.push(full);
        if let Some(inc) = incremental {
            log::info!("Selected {}", inc.path.display());
            selected.push(inc);
        }
    }
    Ok(selected)
}

/// Returns just the paths of a selection, in order.
pub fn selection_paths(selection: &[SelectedArchive]) -> Vec<PathBuf> {
    selection.iter().map(|a| a.path.clone()).collect()
}
