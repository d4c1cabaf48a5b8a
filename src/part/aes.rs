//! In-process part encryption.

use std::fs::{self, File};
use std::io::{self, BufWriter};

use super::{PartCipher, RangeRequest, range};
use crate::crypto::{NoncePolicy, PartEncoder, Passphrase};
use crate::{Error, Result};

/// Extension of parts written by [`AesPartCipher`].
pub const OFSP_EXTENSION: &str = "ofsp";

/// Encrypts parts with AES-256-GCM into the `OFSP` part format.
///
/// Each part gets a fresh salt and nonce prefix from its [`NoncePolicy`]. The
/// part is written to a `.partial` sibling and renamed into place once
/// complete. Parts are named `.ofsp`, not `.gpg`: GnuPG cannot read them, only
/// [`crate::crypto::decrypt_part`] can.
///
/// # Example
///
/// ```rust,no_run
/// use offsite::crypto::Passphrase;
/// use offsite::part::{AesPartCipher, PartCipher, RangeRequest};
///
/// let request = RangeRequest {
///     source: "/backups/home.0.20240101.tar.bz2".into(),
///     destination: "/srv/offsite/1/home.0.20240101.tar.bz2.01of02.ofsp".into(),
///     block_size: 1024 * 1024,
///     offset_blocks: 0,
///     copy_blocks: 4480,
/// };
/// AesPartCipher::new().encrypt(&request, &Passphrase::new("secret"))?;
/// # Ok::<(), offsite::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AesPartCipher {
    nonce_policy: NoncePolicy,
}

impl AesPartCipher {
    /// Creates a cipher with random nonces and the default Argon2id cost.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cipher with a specific nonce policy.
    pub fn with_nonce_policy(nonce_policy: NoncePolicy) -> Self {
        Self { nonce_policy }
    }

    fn write_partial(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()> {
        let mut reader = request.open()?;
        let partial = request.partial_path();
        let file = File::create(&partial).map_err(|e| request.error(e))?;

        let result = (|| -> Result<()> {
            let mut encoder =
                PartEncoder::new(BufWriter::new(file), passphrase, &self.nonce_policy)?;
            let copied = io::copy(&mut reader, &mut encoder)?;
            reader.check_complete(copied)?;
            let writer = encoder.finish()?;
            writer
                .into_inner()
                .map_err(|e| e.into_error())?
                .sync_all()?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&partial);
            return Err(match e {
                Error::Io(io) => request.error(io),
                e @ Error::Extraction { .. } => e,
                other => request.error(other),
            });
        }
        Ok(())
    }
}

impl PartCipher for AesPartCipher {
    fn name(&self) -> &'static str {
        "aes"
    }

    fn extension(&self) -> &'static str {
        OFSP_EXTENSION
    }

    fn encrypt(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()> {
        self.write_partial(request, passphrase)?;
        range::commit(&request.partial_path(), &request.destination).map_err(|e| request.error(e))
    }
}
