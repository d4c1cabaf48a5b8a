//! Volume layout and capacity accounting.
//!
//! A volume is one numbered directory under the work directory, sized to fit
//! one physical medium (CD, DVD, Blu-ray). Files are cut into parts so that
//! no part exceeds the per-file ceiling and no volume exceeds its capacity.
//!
//! # Overview
//!
//! - [`VolumeLimits`] holds the capacity, per-file ceiling and block size.
//! - [`predict_parts`] computes how many parts a file will need before any
//!   state is touched, so split names can carry the total.
//! - [`VolumeAllocator`] owns the rolling [`PackingState`] and opens volume
//!   directories as they fill.
//! - [`part_file_name`] names each part inside its volume.
//!
//! # Layout
//!
//! ```text
//! <work_dir>/1/home.0.20240101.tar.bz2.01of02.gpg
//! <work_dir>/2/home.0.20240101.tar.bz2.02of02.gpg
//! <work_dir>/2/var.0.20240101.tar.bz2.gpg
//! ```
//!
//! Capped parts are always a multiple of the block size. Rounding down leaves
//! at most `block_size - 1` bytes of a volume unused each time a part is
//! capped.

mod allocator;
mod config;
mod naming;
mod step;

pub use allocator::{PackingState, VolumeAllocator};
pub use config::{DEFAULT_BLOCK_SIZE, ISO_MAX_FILE_SIZE, VolumeConfig, VolumeLimits};
pub use naming::{PART_EXTENSION, part_file_name, part_file_name_with};
pub use step::{Reservation, Step, needs_rollover, predict_parts, reserve_step, step_once};
