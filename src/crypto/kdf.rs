//! Passphrase key derivation.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::Passphrase;
use crate::{Error, Result};

/// Length of a derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Largest accepted Argon2 memory cost, in KiB (1 GiB).
///
/// Parts carry their own parameters, so this bounds what reading a crafted
/// part can demand.
pub const MAX_MEMORY_KIB: u32 = 1 << 20;

/// Largest accepted number of Argon2 passes.
pub const MAX_PASSES: u32 = 64;

/// Largest accepted Argon2 lane count.
pub const MAX_LANES: u32 = 16;

/// Argon2id cost parameters stored in every part header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes over memory.
    pub passes: u32,
    /// Degree of parallelism.
    pub lanes: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            passes: Params::DEFAULT_T_COST,
            lanes: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Creates parameters. They are checked when a key is derived.
    pub const fn new(memory_kib: u32, passes: u32, lanes: u32) -> Self {
        Self {
            memory_kib,
            passes,
            lanes,
        }
    }

    /// Rejects parameters above the crate's resource ceilings.
    pub fn check(&self) -> Result<()> {
        if self.memory_kib > MAX_MEMORY_KIB || self.passes > MAX_PASSES || self.lanes > MAX_LANES {
            return Err(Error::ResourceLimitExceeded(format!(
                "key derivation parameters m={} KiB, t={}, p={} exceed m={} KiB, t={}, p={}",
                self.memory_kib,
                self.passes,
                self.lanes,
                MAX_MEMORY_KIB,
                MAX_PASSES,
                MAX_LANES
            )));
        }
        Ok(())
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        self.check()?;
        let params = Params::new(self.memory_kib, self.passes, self.lanes, Some(KEY_LEN))
            .map_err(|e| Error::CryptoError(format!("invalid key derivation parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Derives a 256-bit key from a passphrase with Argon2id.
///
/// # Errors
///
/// - [`Error::ResourceLimitExceeded`] if `params` exceed the ceilings above
/// - [`Error::CryptoError`] if Argon2 rejects the parameters or the salt
pub fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| Error::CryptoError(format!("key derivation failed: {}", e)))?;
    Ok(key)
}
