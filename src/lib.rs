//! # offsite
//!
//! Splits backup archives into encrypted parts that fit onto removable media.
//!
//! Given an ordered list of archives and two ceilings, the largest single
//! output file and the capacity of one volume, this crate cuts each archive
//! into contiguous byte ranges ("parts"), assigns every part to a numbered
//! volume directory and encrypts it with a shared passphrase. By default each
//! part is encrypted by the `gpg` binary and restores with `gpg --decrypt`:
//!
//! ```text
//! <work_dir>/1/home.0.20240101.tar.bz2.gpg
//! <work_dir>/1/var.0.20240101.tar.bz2.01of02.gpg
//! <work_dir>/2/var.0.20240101.tar.bz2.02of02.gpg
//! ```
//!
//! [`AesPartCipher`] is an in-process alternative writing AES-256-GCM parts
//! with the `.ofsp` extension; [`crypto::decrypt_part`] reads them back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offsite::progress::NoProgress;
//! use offsite::select::{select_offsite, selection_paths};
//! use offsite::volume::VolumeLimits;
//! use offsite::{PackOptions, Packer, PassphraseSource, Result};
//!
//! fn main() -> Result<()> {
//!     // Latest full backup per filesystem, plus a newer incremental
//!     let archives = selection_paths(&select_offsite("/var/backups")?);
//!
//!     let options = PackOptions::new("/srv/offsite", VolumeLimits::dvd())
//!         .passphrase(PassphraseSource::file("/etc/offsite/passphrase"));
//!     let report = Packer::new(options).pack(&archives, &mut NoProgress)?;
//!
//!     println!("{} volume(s) created", report.volumes_created);
//!     Ok(())
//! }
//! ```
//!
//! ### Previewing a Plan
//!
//! A dry run places every part and names it without creating directories,
//! reading data or touching the passphrase:
//!
//! ```rust,no_run
//! use offsite::progress::NoProgress;
//! use offsite::volume::VolumeLimits;
//! use offsite::{PackOptions, Packer};
//!
//! let options = PackOptions::new("/srv/offsite", VolumeLimits::cd()).dry_run(true);
//! let report = Packer::new(options).pack(&["/var/backups/home.0.20240101.tar.bz2"], &mut NoProgress)?;
//! for part in &report.parts {
//!     println!("{} -> {}", part.source.display(), part.destination.display());
//! }
//! # Ok::<(), offsite::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `parallel` | Yes | Encrypt placed parts on a Rayon thread pool |
//! | `cli` | No | Command-line interface tool |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Only a volume directory that cannot be
//! created aborts a run; failed parts and unreadable inputs are recorded in the
//! [`PackReport`] and the run continues:
//!
//! ```rust,no_run
//! use offsite::progress::NoProgress;
//! use offsite::volume::VolumeLimits;
//! use offsite::{Error, PackOptions, Packer};
//!
//! let options = PackOptions::new("/srv/offsite", VolumeLimits::cd())
//!     .passphrase(offsite::crypto::Passphrase::new("secret"));
//! match Packer::new(options).pack(&["/var/backups/a.0.x.tar.bz2"], &mut NoProgress) {
//!     Ok(report) if report.is_ok() => println!("all parts written"),
//!     Ok(report) => eprintln!("{} part(s) failed", report.failures.len()),
//!     Err(e @ Error::VolumeCreate { .. }) => {
//!         // Parts placed before the failure were still written
//!         let written = e.partial_report().map_or(0, |r| r.parts.len());
//!         eprintln!("aborted after {} part(s): {}", written, e);
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! ```
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod pack;
pub mod part;
pub mod progress;
pub mod secret;
pub mod select;
pub mod volume;

pub use error::{Error, Result};

// Re-export the packing API at crate root for convenience
pub use pack::{PackOptions, PackReport, Packer, PartFailure, PartRecord, SkippedFile};

// Re-export encryption backends
pub use part::{
    AesPartCipher, GpgPartCipher, OFSP_EXTENSION, PartCipher, RangeRequest, encrypt_range,
};

pub use secret::PassphraseSource;

// Re-export volume API
pub use volume::{VolumeConfig, VolumeLimits, predict_parts};

// Re-export progress API
pub use progress::{AtomicProgress, NoProgress, PackProgress, StatisticsProgress};
