//! Part file header encoding and nonce generation.

use super::kdf::KdfParams;
use crate::{Error, Result};

/// Magic bytes at the start of every encrypted part.
pub const PART_MAGIC: [u8; 4] = *b"OFSP";

/// Current part format version.
pub const PART_FORMAT_VERSION: u8 = 2;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the per-part nonce prefix. The stream construction appends a
/// 32-bit chunk counter and a last-chunk flag to reach the 96-bit GCM nonce.
pub const NONCE_PREFIX_LEN: usize = 7;

/// Default plaintext chunk size: 2^20 bytes.
pub const DEFAULT_CHUNK_LOG2: u8 = 20;

/// Smallest accepted chunk size exponent.
pub const MIN_CHUNK_LOG2: u8 = 10;

/// Largest accepted chunk size exponent.
pub const MAX_CHUNK_LOG2: u8 = 24;

/// Total encoded header length in bytes.
pub const HEADER_LEN: usize = 48;

/// Header written in front of the ciphertext of every encrypted part.
///
/// The whole header is authenticated as associated data of every chunk, so
/// tampering with any field makes decryption fail. The layout is:
/// - Bytes 0..4: magic `OFSP`
/// - Byte 4: format version
/// - Byte 5: chunk size exponent (plaintext chunks of 2^n bytes)
/// - Bytes 6..8: reserved, zero
/// - Bytes 8..12: Argon2 memory cost in KiB (little endian)
/// - Bytes 12..16: Argon2 passes
/// - Bytes 16..20: Argon2 lanes
/// - Bytes 20..36: salt
/// - Bytes 36..43: nonce prefix
/// - Bytes 43..48: reserved, zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeader {
    /// Key derivation cost.
    pub kdf: KdfParams,
    /// Plaintext chunk size exponent.
    pub chunk_log2: u8,
    /// Salt for key derivation.
    pub salt: [u8; SALT_LEN],
    /// Prefix of every chunk nonce.
    pub nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl PartHeader {
    /// Plaintext bytes per chunk.
    pub fn chunk_len(&self) -> usize {
        1usize << self.chunk_log2
    }

    /// Encodes the header to its fixed-size byte representation.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&PART_MAGIC);
        out[4] = PART_FORMAT_VERSION;
        out[5] = self.chunk_log2;
        out[8..12].copy_from_slice(&self.kdf.memory_kib.to_le_bytes());
        out[12..16].copy_from_slice(&self.kdf.passes.to_le_bytes());
        out[16..20].copy_from_slice(&self.kdf.lanes.to_le_bytes());
        out[20..36].copy_from_slice(&self.salt);
        out[36..43].copy_from_slice(&self.nonce_prefix);
        out
    }

    /// Parses a header from the start of an encrypted part.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::CryptoError(format!(
                "part header too short: expected {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        }
        if bytes[..4] != PART_MAGIC {
            return Err(Error::CryptoError("missing part magic".into()));
        }
        if bytes[4] != PART_FORMAT_VERSION {
            return Err(Error::CryptoError(format!(
                "unsupported part format version {}",
                bytes[4]
            )));
        }
        let chunk_log2 = bytes[5];
        if !(MIN_CHUNK_LOG2..=MAX_CHUNK_LOG2).contains(&chunk_log2) {
            return Err(Error::CryptoError(format!(
                "chunk size exponent {} out of range {}..={}",
                chunk_log2, MIN_CHUNK_LOG2, MAX_CHUNK_LOG2
            )));
        }

        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[20..36]);
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        nonce_prefix.copy_from_slice(&bytes[36..43]);

        Ok(Self {
            kdf: KdfParams::new(word(8), word(12), word(16)),
            chunk_log2,
            salt,
            nonce_prefix,
        })
    }
}

/// Policy for generating the salt and nonce prefix of each part.
#[derive(Debug, Clone)]
pub enum NoncePolicy {
    /// Generate salt and nonce prefix from the operating system's CSPRNG.
    Random {
        /// Key derivation cost.
        kdf: KdfParams,
    },
    /// Generate deterministic salt and nonce prefix from a seed.
    ///
    /// Every part gets the same values; only useful for reproducible test
    /// fixtures.
    Deterministic {
        /// Key derivation cost.
        kdf: KdfParams,
        /// Seed for deterministic generation.
        seed: [u8; 32],
    },
    /// Use explicit salt and nonce prefix values.
    Explicit {
        /// Key derivation cost.
        kdf: KdfParams,
        /// Salt bytes.
        salt: [u8; SALT_LEN],
        /// Nonce prefix bytes.
        nonce_prefix: [u8; NONCE_PREFIX_LEN],
    },
}

impl Default for NoncePolicy {
    fn default() -> Self {
        Self::Random {
            kdf: KdfParams::default(),
        }
    }
}

impl NoncePolicy {
    /// Creates a random nonce policy with default parameters.
    pub fn random() -> Self {
        Self::default()
    }

    /// Creates a random nonce policy with a specific key derivation cost.
    pub fn random_with_kdf(kdf: KdfParams) -> Self {
        Self::Random { kdf }
    }

    /// Creates an explicit nonce policy.
    pub fn explicit(
        kdf: KdfParams,
        salt: [u8; SALT_LEN],
        nonce_prefix: [u8; NONCE_PREFIX_LEN],
    ) -> Self {
        Self::Explicit {
            kdf,
            salt,
            nonce_prefix,
        }
    }

    /// Returns the key derivation cost for this policy.
    pub fn kdf(&self) -> KdfParams {
        match self {
            Self::Random { kdf } | Self::Deterministic { kdf, .. } | Self::Explicit { kdf, .. } => {
                *kdf
            }
        }
    }

    /// Generates a part header according to the policy.
    pub fn generate(&self) -> Result<PartHeader> {
        let kdf = self.kdf();
        let (salt, nonce_prefix) = match self {
            Self::Random { .. } => {
                let mut salt = [0u8; SALT_LEN];
                let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
                getrandom::getrandom(&mut salt)
                    .and_then(|()| getrandom::getrandom(&mut nonce_prefix))
                    .map_err(|e| Error::CryptoError(format!("random source failed: {}", e)))?;
                (salt, nonce_prefix)
            }
            Self::Deterministic { seed, .. } => {
                use sha2::{Digest, Sha256};

                let salt_hash = Sha256::new().chain_update(seed).chain_update(b"salt").finalize();
                let nonce_hash = Sha256::new().chain_update(seed).chain_update(b"nonce").finalize();

                let mut salt = [0u8; SALT_LEN];
                salt.copy_from_slice(&salt_hash[..SALT_LEN]);
                let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
                nonce_prefix.copy_from_slice(&nonce_hash[..NONCE_PREFIX_LEN]);
                (salt, nonce_prefix)
            }
            Self::Explicit {
                salt, nonce_prefix, ..
            } => (*salt, *nonce_prefix),
        };

        Ok(PartHeader {
            kdf,
            chunk_log2: DEFAULT_CHUNK_LOG2,
            salt,
            nonce_prefix,
        })
    }
}
