//! Rolling volume state across a packing run.

use std::fs;
use std::path::PathBuf;

use super::step::{Reservation, needs_rollover, reserve_step};
use super::VolumeConfig;
use crate::{Error, Result};

/// The allocator's mutable state.
///
/// `current_volume` is 0 until the first volume is opened. Between parts,
/// `remaining_bytes` never exceeds the volume capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackingState {
    /// Number of the open volume, 0 if none is open yet.
    pub current_volume: u32,
    /// Free bytes left in the open volume.
    pub remaining_bytes: u64,
}

/// Places parts onto volumes, opening a new volume whenever the current one
/// cannot take another block.
///
/// Each volume is a directory `<work_dir>/<n>`. Volumes are opened in strictly
/// increasing order and never revisited.
///
/// # Example
///
/// ```rust
/// use offsite::volume::{VolumeAllocator, VolumeConfig, VolumeLimits};
///
/// let limits = VolumeLimits::new(10_000, 10_000, 100).unwrap();
/// // Dry run: directories are not created
/// let mut allocator = VolumeAllocator::new(VolumeConfig::new("/tmp/plan", limits), true);
///
/// assert!(allocator.ensure_capacity().unwrap());
/// let reservation = allocator.reserve(6_000);
/// assert!(reservation.to_eof);
/// assert_eq!(allocator.state().remaining_bytes, 4_000);
/// ```
#[derive(Debug)]
pub struct VolumeAllocator {
    config: VolumeConfig,
    state: PackingState,
    dry_run: bool,
}

impl VolumeAllocator {
    /// Creates an allocator with no open volume.
    ///
    /// With `dry_run` set, volume directories are planned but never created.
    pub fn new(config: VolumeConfig, dry_run: bool) -> Self {
        Self {
            config,
            state: PackingState::default(),
            dry_run,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &PackingState {
        &self.state
    }

    /// Returns the volume configuration.
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Number of volumes opened so far.
    pub fn volumes_opened(&self) -> u32 {
        self.state.current_volume
    }

    /// Free space to feed into prediction: the open volume's remaining bytes,
    /// or a full volume if none is open yet.
    pub fn bytes_available_now(&self) -> u64 {
        if self.state.current_volume == 0 {
            self.config.limits.volume_capacity
        } else {
            self.state.remaining_bytes
        }
    }

    /// Directory of the open volume.
    pub fn current_dir(&self) -> PathBuf {
        self.config.volume_dir(self.state.current_volume)
    }

    /// Opens a new volume if the current one cannot take another block.
    ///
    /// Returns `true` if a volume was opened. A volume directory that already
    /// exists is reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VolumeCreate`] if the directory cannot be created. The
    /// state is left unchanged in that case.
    pub fn ensure_capacity(&mut self) -> Result<bool> {
        if !needs_rollover(self.state.remaining_bytes, &self.config.limits) {
            return Ok(false);
        }

        let volume = self.state.current_volume + 1;
        let dir = self.config.volume_dir(volume);
        if self.dry_run {
            log::debug!("Dry run: would open volume {} at {}", volume, dir.display());
        } else {
            fs::create_dir_all(&dir).map_err(|source| Error::VolumeCreate {
                volume,
                path: dir.clone(),
                source,
                report: None,
            })?;
            log::info!("Opened volume {} at {}", volume, dir.display());
        }

        self.state = PackingState {
            current_volume: volume,
            remaining_bytes: self.config.limits.volume_capacity,
        };
        Ok(true)
    }

    /// Reserves space in the open volume for the next part of a file with
    /// `file_remaining` unwritten bytes.
    ///
    /// Call [`ensure_capacity`](Self::ensure_capacity) first.
    pub fn reserve(&mut self, file_remaining: u64) -> Reservation {
        let reservation = reserve_step(
            self.state.remaining_bytes,
            file_remaining,
            &self.config.limits,
        );
        self.state.remaining_bytes -= reservation.copy_bytes;
        log::debug!(
            "Reserved {} bytes{} in volume {}, {} bytes left",
            reservation.copy_bytes,
            if reservation.to_eof { " (to EOF)" } else { "" },
            self.state.current_volume,
            self.state.remaining_bytes
        );
        reservation
    }
}
