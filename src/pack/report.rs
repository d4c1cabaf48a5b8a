//! Outcome of a packing run.

use std::path::PathBuf;

/// One placed part of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// The source archive.
    pub source: PathBuf,
    /// Volume holding the part (1-indexed).
    pub volume: u32,
    /// Full path of the encrypted part.
    pub destination: PathBuf,
    /// 1-based index of the part within its file.
    pub part_index: u32,
    /// Number of parts the file was split into.
    pub total_parts: u32,
    /// Byte offset of the range within the source.
    pub offset: u64,
    /// Length of the range in bytes (the planned remainder for EOF parts).
    pub length: u64,
    /// The range runs to end of file.
    pub to_eof: bool,
}

impl PartRecord {
    /// End of the byte range, exclusive.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// A part that was placed but could not be written.
#[derive(Debug, Clone)]
pub struct PartFailure {
    /// The placement of the failed part.
    pub part: PartRecord,
    /// Rendered error.
    pub error: String,
}

/// A source file that was not packed at all.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// The source file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Summary of a packing run.
///
/// A run that returns a report completed its pass over the input; per-part
/// failures and skipped files are collected here instead of aborting.
#[derive(Debug, Clone, Default)]
pub struct PackReport {
    /// Highest volume number opened (0 if nothing was placed).
    pub volumes_created: u32,
    /// Parts written successfully, in placement order.
    pub parts: Vec<PartRecord>,
    /// Parts that failed, in placement order.
    pub failures: Vec<PartFailure>,
    /// Files skipped because their size could not be determined.
    pub skipped: Vec<SkippedFile>,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
    /// No data was extracted or encrypted.
    pub dry_run: bool,
}

impl PackReport {
    /// Returns `true` if every part was written and nothing was skipped or
    /// cancelled.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    /// Total source bytes covered by written parts.
    pub fn bytes_packed(&self) -> u64 {
        self.parts.iter().map(|p| p.length).sum()
    }

    /// Parts written into `volume`.
    pub fn parts_in_volume(&self, volume: u32) -> impl Iterator<Item = &PartRecord> {
        self.parts.iter().filter(move |p| p.volume == volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(volume: u32, offset: u64, length: u64) -> PartRecord {
        PartRecord {
            source: PathBuf::from("/b/x.0.t.tar.bz2"),
            volume,
            destination: PathBuf::from(format!("/w/{}/x", volume)),
            part_index: 1,
            total_parts: 2,
            offset,
            length,
            to_eof: false,
        }
    }

    #[test]
    fn test_report_totals() {
        let report = PackReport {
            volumes_created: 2,
            parts: vec![part(1, 0, 4_000), part(2, 4_000, 2_000)],
            ..Default::default()
        };
        assert!(report.is_ok());
        assert_eq!(report.bytes_packed(), 6_000);
        assert_eq!(report.parts_in_volume(2).count(), 1);
        assert_eq!(report.parts[1].end(), 6_000);
    }

    #[test]
    fn test_report_not_ok_with_skips_or_cancel() {
        let mut report = PackReport::default();
        report.skipped.push(SkippedFile {
            path: PathBuf::from("/gone"),
            reason: "not found".into(),
        });
        assert!(!report.is_ok());

        let cancelled = PackReport {
            cancelled: true,
            ..Default::default()
        };
        assert!(!cancelled.is_ok());
    }
}
