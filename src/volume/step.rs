//! The single placement step shared by prediction and allocation.
//!
//! [`predict_parts`] simulates a file's placement by looping over
//! [`step_once`], and [`VolumeAllocator`](super::VolumeAllocator) performs the
//! real placement with the same two halves, [`needs_rollover`] and
//! [`reserve_step`]. Because both paths run the same arithmetic, the predicted
//! part count always equals the number of parts the allocator produces.

use super::VolumeLimits;
use crate::{Error, Result};

/// How much of a file the current volume absorbs in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Bytes this part covers. When `to_eof` is set this is the whole
    /// remainder of the file and the extractor copies to end of file.
    pub copy_bytes: u64,
    /// The part runs to the end of the source file.
    pub to_eof: bool,
}

/// Outcome of one simulated placement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Bytes of the file placed by this step.
    pub consumed: u64,
    /// Bytes left in the volume after the step.
    pub remaining: u64,
    /// A fresh volume was opened before placing.
    pub rolled_over: bool,
    /// The step placed the rest of the file.
    pub to_eof: bool,
}

/// Returns `true` if a volume with `remaining` bytes free cannot take another
/// block and a new volume must be opened.
#[inline]
pub fn needs_rollover(remaining: u64, limits: &VolumeLimits) -> bool {
    remaining < limits.block_size
}

/// Decides how much of `file_remaining` fits into a volume with `remaining`
/// bytes free.
///
/// When the file is at least as large as the smaller of the free space and the
/// per-file ceiling, the part is capped to that smaller value rounded down to
/// a block multiple. Otherwise the rest of the file fits and the part runs to
/// end of file.
pub fn reserve_step(remaining: u64, file_remaining: u64, limits: &VolumeLimits) -> Reservation {
    if file_remaining >= remaining.min(limits.max_file_size) {
        let copy_bytes = limits
            .round_down(remaining)
            .min(limits.capped_part_size());
        Reservation {
            copy_bytes,
            to_eof: false,
        }
    } else {
        Reservation {
            copy_bytes: file_remaining,
            to_eof: true,
        }
    }
}

/// Runs one placement step: rolls over if needed, then reserves.
pub fn step_once(remaining: u64, file_remaining: u64, limits: &VolumeLimits) -> Step {
    let rolled_over = needs_rollover(remaining, limits);
    let available = if rolled_over {
        limits.volume_capacity
    } else {
        remaining
    };

    let reservation = reserve_step(available, file_remaining, limits);
    Step {
        consumed: reservation.copy_bytes,
        remaining: available - reservation.copy_bytes,
        rolled_over,
        to_eof: reservation.to_eof,
    }
}

/// Predicts how many parts a file of `file_size` bytes will be split into.
///
/// `bytes_available_now` is the free space of the currently open volume, or
/// the volume capacity if no volume is open yet. Returns 0 only for an empty
/// file.
///
/// # Errors
///
/// Returns [`Error::InvalidLimits`] if the file would need more than
/// `u32::MAX` parts under these limits.
///
/// # Example
///
/// ```rust
/// use offsite::volume::{VolumeLimits, predict_parts};
///
/// let limits = VolumeLimits::new(10_000, 10_000, 100).unwrap();
/// assert_eq!(predict_parts(25_000, &limits, 10_000)?, 3);
/// assert_eq!(predict_parts(6_000, &limits, 4_000)?, 2);
/// assert_eq!(predict_parts(0, &limits, 10_000)?, 0);
/// # Ok::<(), offsite::Error>(())
/// ```
pub fn predict_parts(file_size: u64, limits: &VolumeLimits, bytes_available_now: u64) -> Result<u32> {
    let too_many = || {
        Error::InvalidLimits(format!(
            "{} bytes would need more than {} parts of at most {} bytes",
            file_size,
            u32::MAX,
            limits.capped_part_size()
        ))
    };

    // No part exceeds the capped size, so this bounds the count from below
    if file_size.div_ceil(limits.capped_part_size()) > u64::from(u32::MAX) {
        return Err(too_many());
    }

    let mut remaining = bytes_available_now;
    let mut file_remaining = file_size;
    let mut parts = 0u32;

    while file_remaining > 0 {
        let step = step_once(remaining, file_remaining, limits);
        file_remaining -= step.consumed;
        remaining = step.remaining;
        parts = parts.checked_add(1).ok_or_else(too_many)?;
    }

    log::debug!(
        "Predicted {} part(s) for {} bytes with {} bytes available",
        parts,
        file_size,
        bytes_available_now
    );
    Ok(parts)
}
