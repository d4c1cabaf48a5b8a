//! Progress reporting and cancellation for packing runs.
//!
//! This module provides:
//! - The [`PackProgress`] callback trait, including the cancellation hook
//!   checked between parts
//! - [`StatisticsProgress`] and the thread-safe [`AtomicProgress`]
//! - IEC byte formatting and size parsing shared by the library and the CLI
//!
//! # Example
//!
//! ```rust,no_run
//! use offsite::progress::AtomicProgress;
//! use offsite::volume::VolumeLimits;
//! use offsite::{PackOptions, Packer, PassphraseSource};
//!
//! let progress = AtomicProgress::shared();
//! let cancel = progress.clone();
//! // e.g. from a signal handler
//! std::thread::spawn(move || cancel.cancel());
//!
//! let options = PackOptions::new("/srv/offsite", VolumeLimits::dvd())
//!     .passphrase(PassphraseSource::file("/etc/offsite/passphrase"));
//! let report = Packer::new(options).pack(&["/backups/home.0.x.tar.bz2"], &mut progress.clone())?;
//! println!("cancelled: {}", report.cancelled);
//! # Ok::<(), offsite::Error>(())
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::pack::PartRecord;
use crate::{Error, Result};

/// IEC byte unit: 1 KiB = 1024 bytes.
pub const BYTES_KIB: u64 = 1024;
/// IEC byte unit: 1 MiB = 1024 KiB.
pub const BYTES_MIB: u64 = 1024 * BYTES_KIB;
/// IEC byte unit: 1 GiB = 1024 MiB.
pub const BYTES_GIB: u64 = 1024 * BYTES_MIB;
/// IEC byte unit: 1 TiB = 1024 GiB.
pub const BYTES_TIB: u64 = 1024 * BYTES_GIB;

// Floating point versions for formatting calculations
const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Progress callbacks for a packing run.
///
/// All methods have no-op defaults. In parallel mode the callbacks are
/// serialized behind a lock, so implementations only need to be `Send`.
pub trait PackProgress: Send {
    /// Called once before packing starts with the number of parts and bytes
    /// the run will produce.
    fn on_total(&mut self, total_parts: u64, total_bytes: u64) {
        let _ = (total_parts, total_bytes);
    }

    /// Called when a file's placement begins.
    fn on_file_start(&mut self, path: &Path, size: u64, total_parts: u32) {
        let _ = (path, size, total_parts);
    }

    /// Called when a new volume is opened.
    fn on_volume_opened(&mut self, volume: u32) {
        let _ = volume;
    }

    /// Called after each part is encrypted, or fails to be.
    fn on_part_complete(&mut self, record: &PartRecord, success: bool) {
        let _ = (record, success);
    }

    /// Called on any warning during packing (skipped or empty files).
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }

    /// Checks if cancellation has been requested.
    ///
    /// Called before every part. Returning `true` stops the run before the
    /// next part starts; parts already written are kept.
    fn should_cancel(&self) -> bool {
        false
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl PackProgress for NoProgress {}

/// A progress reporter that collects statistics.
#[derive(Debug, Clone)]
pub struct StatisticsProgress {
    /// Parts the run announced.
    pub total_parts: u64,
    /// Bytes the run announced.
    pub total_bytes: u64,
    /// Parts completed successfully.
    pub parts_done: u64,
    /// Parts that failed.
    pub parts_failed: u64,
    /// Source bytes covered by completed parts.
    pub bytes_done: u64,
    /// Volumes opened, in order.
    pub volumes: Vec<u32>,
    /// Warnings collected.
    pub warnings: Vec<String>,
    /// Cancel once this many parts have completed.
    pub cancel_after: Option<u64>,
    start_time: Instant,
}

impl Default for StatisticsProgress {
    fn default() -> Self {
        Self {
            total_parts: 0,
            total_bytes: 0,
            parts_done: 0,
            parts_failed: 0,
            bytes_done: 0,
            volumes: Vec::new(),
            warnings: Vec::new(),
            cancel_after: None,
            start_time: Instant::now(),
        }
    }
}

impl StatisticsProgress {
    /// Creates a new statistics progress reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reporter that requests cancellation after `parts` parts.
    pub fn cancel_after(parts: u64) -> Self {
        Self {
            cancel_after: Some(parts),
            ..Self::default()
        }
    }

    /// Returns elapsed time since creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl PackProgress for StatisticsProgress {
    fn on_total(&mut self, total_parts: u64, total_bytes: u64) {
        self.total_parts = total_parts;
        self.total_bytes = total_bytes;
    }

    fn on_volume_opened(&mut self, volume: u32) {
        self.volumes.push(volume);
    }

    fn on_part_complete(&mut self, record: &PartRecord, success: bool) {
        if success {
            self.parts_done += 1;
            self.bytes_done += record.length;
        } else {
            self.parts_failed += 1;
        }
    }

    fn on_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn should_cancel(&self) -> bool {
        self.cancel_after
            .is_some_and(|limit| self.parts_done + self.parts_failed >= limit)
    }
}

/// A thread-safe progress reporter using atomics.
///
/// Allows progress to be monitored and cancellation to be requested from
/// another thread, such as a Ctrl+C handler.
#[derive(Debug)]
pub struct AtomicProgress {
    total_parts: AtomicU64,
    total_bytes: AtomicU64,
    parts_done: AtomicU64,
    bytes_done: AtomicU64,
    cancelled: AtomicBool,
    start_time: Instant,
}

impl Default for AtomicProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgress {
    /// Creates a new atomic progress reporter.
    pub fn new() -> Self {
        Self {
            total_parts: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            parts_done: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    /// Creates a shared atomic progress reporter.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of parts the run will produce.
    pub fn total_parts(&self) -> u64 {
        self.total_parts.load(Ordering::Relaxed)
    }

    /// Returns the number of source bytes the run will cover.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Returns the number of parts finished so far.
    pub fn parts_done(&self) -> u64 {
        self.parts_done.load(Ordering::Relaxed)
    }

    /// Returns the source bytes covered by finished parts.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns completion percentage (0.0 - 100.0).
    pub fn percentage(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            0.0
        } else {
            (self.bytes_done() as f64 / total as f64) * 100.0
        }
    }

    /// Returns processing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            self.bytes_done() as f64 / elapsed
        }
    }

    fn record(&self, record: &PartRecord) {
        self.parts_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_done.fetch_add(record.length, Ordering::Relaxed);
    }
}

impl PackProgress for AtomicProgress {
    fn on_total(&mut self, total_parts: u64, total_bytes: u64) {
        self.total_parts.store(total_parts, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    fn on_part_complete(&mut self, record: &PartRecord, _success: bool) {
        self.record(record);
    }

    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// Progress reporter for shared `Arc<AtomicProgress>`.
impl PackProgress for Arc<AtomicProgress> {
    fn on_total(&mut self, total_parts: u64, total_bytes: u64) {
        self.total_parts.store(total_parts, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    fn on_part_complete(&mut self, record: &PartRecord, _success: bool) {
        self.record(record);
    }

    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// Formats bytes per second as a human-readable string using IEC units.
pub fn format_bytes_per_second_iec(rate: f64) -> String {
    if rate < BYTES_KB {
        format!("{:.0} B/s", rate)
    } else if rate < BYTES_MB {
        format!("{:.1} KiB/s", rate / BYTES_KB)
    } else if rate < BYTES_GB {
        format!("{:.1} MiB/s", rate / BYTES_MB)
    } else {
        format!("{:.1} GiB/s", rate / BYTES_GB)
    }
}

/// Formats a duration as a human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Formats bytes as a human-readable string using IEC units (KiB, MiB, GiB).
///
/// # Examples
///
/// ```rust
/// use offsite::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(0), "0 B");
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1024), "1.0 KiB");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// assert_eq!(format_bytes_iec(1048576), "1.0 MiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let bytes_f64 = bytes as f64;
    if bytes_f64 < BYTES_KB {
        format!("{} B", bytes)
    } else if bytes_f64 < BYTES_MB {
        format!("{:.1} KiB", bytes_f64 / BYTES_KB)
    } else if bytes_f64 < BYTES_GB {
        format!("{:.1} MiB", bytes_f64 / BYTES_MB)
    } else {
        format!("{:.1} GiB", bytes_f64 / BYTES_GB)
    }
}

/// Parses a byte size such as `4096`, `700M`, `4480MiB` or `23G`.
///
/// Suffixes are binary: `K`/`KiB`, `M`/`MiB`, `G`/`GiB`, `T`/`TiB`, case
/// insensitive, with an optional `B` (`700MB` is 700 MiB). A bare number is
/// bytes.
///
/// # Examples
///
/// ```rust
/// use offsite::progress::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("700M").unwrap(), 700 * 1024 * 1024);
/// assert_eq!(parse_size("4480MiB").unwrap(), 4480 * 1024 * 1024);
/// assert!(parse_size("lots").is_err());
/// ```
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let invalid = || Error::InvalidLimits(format!("invalid size '{}'", input));
    if digits.is_empty() {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => BYTES_KIB,
        "m" | "mb" | "mib" => BYTES_MIB,
        "g" | "gb" | "gib" => BYTES_GIB,
        "t" | "tb" | "tib" => BYTES_TIB,
        _ => return Err(invalid()),
    };

    value.checked_mul(multiplier).ok_or_else(invalid)
}
