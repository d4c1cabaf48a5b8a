//! Size limits and directory layout for volumes.

use std::path::{Path, PathBuf};

use crate::progress::BYTES_MIB;
use crate::{Error, Result};

/// Size ceilings that drive the packing algorithm.
///
/// All values are in bytes. Sizes count plaintext bytes of the source
/// archives. Encryption adds overhead per part: a few hundred bytes for the
/// gpg backend, and for the AES backend [`crate::crypto::HEADER_LEN`] plus a
/// 16-byte tag per started MiB (see [`crate::crypto::encrypted_len`]).
/// Capacities for real media should leave that headroom.
///
/// # Example
///
/// ```rust
/// use offsite::volume::VolumeLimits;
///
/// let limits = VolumeLimits::new(10_000, 3_000, 100).unwrap();
/// assert_eq!(limits.capped_part_size(), 3_000);
///
/// // Block size larger than the per-file ceiling is rejected
/// assert!(VolumeLimits::new(10_000, 50, 100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLimits {
    /// Capacity of one volume.
    pub volume_capacity: u64,
    /// Largest single output file.
    pub max_file_size: u64,
    /// Alignment granularity of every capped part.
    pub block_size: u64,
}

impl VolumeLimits {
    /// Creates validated limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLimits`] if any value is zero or if
    /// `block_size` exceeds either ceiling.
    pub fn new(volume_capacity: u64, max_file_size: u64, block_size: u64) -> Result<Self> {
        let limits = Self {
            volume_capacity,
            max_file_size,
            block_size,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Checks the invariants the packing algorithm relies on.
    pub fn validate(&self) -> Result<()> {
        if self.volume_capacity == 0 || self.max_file_size == 0 || self.block_size == 0 {
            return Err(Error::InvalidLimits(format!(
                "all limits must be non-zero (capacity {}, max file size {}, block size {})",
                self.volume_capacity, self.max_file_size, self.block_size
            )));
        }
        if self.block_size > self.max_file_size {
            return Err(Error::InvalidLimits(format!(
                "block size {} exceeds max file size {}",
                self.block_size, self.max_file_size
            )));
        }
        if self.block_size > self.volume_capacity {
            return Err(Error::InvalidLimits(format!(
                "block size {} exceeds volume capacity {}",
                self.block_size, self.volume_capacity
            )));
        }
        Ok(())
    }

    /// Returns `value` rounded down to a multiple of the block size.
    pub fn round_down(&self, value: u64) -> u64 {
        value - value % self.block_size
    }

    /// Largest part the per-file ceiling allows.
    pub fn capped_part_size(&self) -> u64 {
        self.round_down(self.max_file_size)
    }

    /// Replaces the per-file ceiling.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Result<Self> {
        self.max_file_size = max_file_size;
        self.validate()?;
        Ok(self)
    }

    /// Replaces the block size.
    pub fn with_block_size(mut self, block_size: u64) -> Result<Self> {
        self.block_size = block_size;
        self.validate()?;
        Ok(self)
    }

    fn media(volume_capacity: u64) -> Self {
        Self {
            volume_capacity,
            max_file_size: volume_capacity.min(ISO_MAX_FILE_SIZE),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Limits for a 700 MiB CD-R.
    pub fn cd() -> Self {
        Self::media(700 * BYTES_MIB)
    }

    /// Limits for a single-layer DVD (4.7 GB).
    pub fn dvd() -> Self {
        Self::media(4_700_000_000)
    }

    /// Limits for a dual-layer DVD (8.5 GB).
    pub fn dvd_dl() -> Self {
        Self::media(8_500_000_000)
    }

    /// Limits for a single-layer Blu-ray disc (25 GB).
    pub fn bluray() -> Self {
        Self::media(25_000_000_000)
    }
}

/// Largest file an ISO 9660 filesystem can hold without multi-extent files.
pub const ISO_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024 - 1;

/// Default block size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = BYTES_MIB;

impl Default for VolumeLimits {
    fn default() -> Self {
        Self::dvd()
    }
}

/// Limits plus the work directory that receives the volume tree.
///
/// # Example
///
/// ```rust
/// use offsite::volume::{VolumeConfig, VolumeLimits};
///
/// let config = VolumeConfig::new("/srv/offsite", VolumeLimits::cd());
/// assert_eq!(config.volume_dir(1).to_str().unwrap(), "/srv/offsite/1");
/// assert_eq!(config.volume_dir(12).to_str().unwrap(), "/srv/offsite/12");
/// ```
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    /// Size ceilings.
    pub limits: VolumeLimits,
    work_dir: PathBuf,
}

impl VolumeConfig {
    /// Creates a new volume configuration.
    pub fn new(work_dir: impl AsRef<Path>, limits: VolumeLimits) -> Self {
        Self {
            limits,
            work_dir: work_dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the work directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory holding the files of volume `volume_number` (1-indexed).
    pub fn volume_dir(&self, volume_number: u32) -> PathBuf {
        self.work_dir.join(volume_number.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_dir_layout() {
        let config = VolumeConfig::new("/work", VolumeLimits::cd());
        assert_eq!(config.volume_dir(1), PathBuf::from("/work/1"));
        assert_eq!(config.volume_dir(10), PathBuf::from("/work/10"));
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(VolumeLimits::new(0, 100, 10).is_err());
        assert!(VolumeLimits::new(100, 0, 10).is_err());
        assert!(VolumeLimits::new(100, 100, 0).is_err());
    }

    #[test]
    fn test_validate_block_bounds() {
        assert!(VolumeLimits::new(10_000, 10_000, 100).is_ok());
        assert!(VolumeLimits::new(10_000, 99, 100).is_err());
        assert!(VolumeLimits::new(99, 10_000, 100).is_err());
        // Per-file ceiling above capacity is allowed; capacity then governs
        assert!(VolumeLimits::new(10_000, 50_000, 100).is_ok());
    }

    #[test]
    fn test_round_down() {
        let limits = VolumeLimits::new(10_000, 3_050, 100).unwrap();
        assert_eq!(limits.round_down(4_050), 4_000);
        assert_eq!(limits.round_down(99), 0);
        assert_eq!(limits.capped_part_size(), 3_000);
    }

    #[test]
    fn test_preset_sizes() {
        assert_eq!(VolumeLimits::cd().volume_capacity, 700 * 1024 * 1024);
        assert_eq!(VolumeLimits::cd().max_file_size, 700 * 1024 * 1024);
        assert_eq!(VolumeLimits::dvd().max_file_size, ISO_MAX_FILE_SIZE);
        assert_eq!(VolumeLimits::bluray().volume_capacity, 25_000_000_000);
        for preset in [
            VolumeLimits::cd(),
            VolumeLimits::dvd(),
            VolumeLimits::dvd_dl(),
            VolumeLimits::bluray(),
        ] {
            preset.validate().unwrap();
        }
    }

    #[test]
    fn test_builders_revalidate() {
        let limits = VolumeLimits::cd().with_max_file_size(100 * BYTES_MIB).unwrap();
        assert_eq!(limits.max_file_size, 100 * BYTES_MIB);
        assert!(VolumeLimits::cd().with_block_size(0).is_err());
    }
}
