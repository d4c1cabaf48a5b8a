//! Packing runs: placement of every part and the report they produce.
//!
//! [`Packer::pack`] is a single greedy left-to-right pass. For each file it
//! predicts the part count, then for each part opens a volume if needed,
//! reserves space, names the part and hands it to the
//! [`PartCipher`](crate::part::PartCipher). Placement is always sequential; with more than
//! one thread only the encryption of already placed parts runs in parallel.
//!
//! Only a volume directory that cannot be created ends the run with an
//! error. Everything else is collected in the [`PackReport`].

mod driver;
mod report;

pub use driver::{PackOptions, Packer};
pub use report::{PackReport, PartFailure, PartRecord, SkippedFile};
