//! Extraction and encryption of individual parts.
//!
//! A part is described by a [`RangeRequest`]: a block-addressed byte range of
//! one source archive and the destination of its encrypted form. The
//! [`PartCipher`] trait is the seam between packing and the encryption
//! backend:
//!
//! - [`GpgPartCipher`] pipes the range into `gpg --symmetric` (the default),
//!   producing standard OpenPGP `.gpg` files
//! - [`AesPartCipher`] encrypts in process into `.ofsp` parts, readable with
//!   [`crate::crypto::decrypt_part`]
//!
//! Both write to a `.partial` sibling first and rename on success, so an
//! interrupted or failed part never leaves a truncated destination behind.

mod aes;
mod gpg;
mod range;

pub use aes::{AesPartCipher, OFSP_EXTENSION};
pub use gpg::GpgPartCipher;
pub use range::{RangeReader, RangeRequest};

use crate::crypto::Passphrase;
use crate::secret::PassphraseSource;
use crate::volume::PART_EXTENSION;
use crate::{Error, Result};

/// An encryption backend for parts.
///
/// Implementations must be usable from several threads at once; the packer
/// may run independent parts in parallel.
pub trait PartCipher: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// File extension of the parts this backend writes, without the dot.
    fn extension(&self) -> &'static str {
        PART_EXTENSION
    }

    /// Extracts the requested range and writes its encrypted form to
    /// `request.destination`.
    ///
    /// Failures should be reported as [`Error::Extraction`] carrying the
    /// request's source, offset and length.
    fn encrypt(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()>;
}

impl<C: PartCipher + ?Sized> PartCipher for &C {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn extension(&self) -> &'static str {
        (**self).extension()
    }

    fn encrypt(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()> {
        (**self).encrypt(request, passphrase)
    }
}

impl<C: PartCipher + ?Sized> PartCipher for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn extension(&self) -> &'static str {
        (**self).extension()
    }

    fn encrypt(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()> {
        (**self).encrypt(request, passphrase)
    }
}

/// Encrypts one part.
///
/// In dry-run mode nothing is read, written or asked of the passphrase
/// source. Otherwise the passphrase is read once for this part, an existing
/// destination is refused, and the request is handed to `cipher`.
///
/// # Errors
///
/// - [`Error::Passphrase`] if the source cannot produce a passphrase
/// - [`Error::DestinationExists`] if something already occupies the destination
/// - [`Error::Extraction`] if extraction or encryption fails
pub fn encrypt_range(
    cipher: &dyn PartCipher,
    request: &RangeRequest,
    passphrase: &PassphraseSource,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        return Ok(());
    }

    if request.destination.exists() {
        return Err(Error::DestinationExists {
            path: request.destination.clone(),
        });
    }

    let passphrase = passphrase.read()?;
    log::debug!(
        "Encrypting {} bytes {}..{} with {} into {}",
        request.source.display(),
        request.offset(),
        request
            .length()
            .map_or_else(|| "EOF".to_string(), |len| (request.offset() + len).to_string()),
        cipher.name(),
        request.destination.display()
    );
    cipher.encrypt(request, &passphrase)
}
