//! Authenticated encryption for volume parts.
//!
//! A part written by the in-process backend is a [`PartHeader`] followed by
//! the part's byte range sealed with AES-256-GCM in a chunked stream:
//!
//! - Argon2id derives the key from the run's [`Passphrase`] and a per-part salt
//! - plaintext is cut into chunks of 2^n bytes, each sealed with its own nonce
//!   (7-byte prefix, 32-bit big-endian counter, last-chunk flag)
//! - the encoded header is associated data of every chunk
//!
//! Reordering, dropping or truncating chunks, flipping ciphertext bits or
//! editing the header all make [`decrypt_part`] fail instead of returning
//! altered data.

mod header;
mod kdf;
mod passphrase;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::{Key, Payload};
use aes_gcm::Aes256Gcm;
use std::io::{self, Read, Write};

use crate::{Error, Result};

pub use header::{
    DEFAULT_CHUNK_LOG2, HEADER_LEN, MAX_CHUNK_LOG2, MIN_CHUNK_LOG2, NONCE_PREFIX_LEN, NoncePolicy,
    PART_FORMAT_VERSION, PART_MAGIC, PartHeader, SALT_LEN,
};
pub use kdf::{KEY_LEN, KdfParams, MAX_LANES, MAX_MEMORY_KIB, MAX_PASSES, derive_key};
pub use passphrase::Passphrase;

/// Authentication tag appended to every sealed chunk.
pub const TAG_LEN: usize = 16;

/// Streaming encoder that writes a complete encrypted part.
///
/// The header goes to the output as soon as the encoder is created. Plaintext
/// written afterwards is sealed one chunk at a time; a full chunk is held back
/// until more data arrives, so [`finish`](Self::finish) can seal the final
/// chunk with the last-chunk flag.
pub struct PartEncoder<W> {
    inner: W,
    stream: EncryptorBE32<Aes256Gcm>,
    aad: [u8; HEADER_LEN],
    buffer: Vec<u8>,
    chunk_len: usize,
    plaintext_len: u64,
}

impl<W> std::fmt::Debug for PartEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartEncoder")
            .field("chunk_len", &self.chunk_len)
            .field("plaintext_len", &self.plaintext_len)
            .finish_non_exhaustive()
    }
}

impl<W: Write> PartEncoder<W> {
    /// Creates an encoder with a header from `nonce_policy` and writes the
    /// header.
    ///
    /// # Errors
    ///
    /// Returns an error if the random source fails, if key derivation fails
    /// or if the header cannot be written.
    pub fn new(output: W, passphrase: &Passphrase, nonce_policy: &NoncePolicy) -> Result<Self> {
        Self::with_header(output, passphrase, nonce_policy.generate()?)
    }

    /// Creates an encoder for a specific header and writes the header.
    pub fn with_header(mut output: W, passphrase: &Passphrase, header: PartHeader) -> Result<Self> {
        let aad = header.encode();
        // Reject what the reader would reject
        PartHeader::parse(&aad)?;
        let key = derive_key(passphrase, &header.salt, &header.kdf)?;
        let stream = EncryptorBE32::<Aes256Gcm>::new(
            Key::<Aes256Gcm>::from_slice(&key[..]),
            GenericArray::from_slice(&header.nonce_prefix),
        );
        output.write_all(&aad)?;

        Ok(Self {
            inner: output,
            stream,
            aad,
            buffer: Vec::with_capacity(header.chunk_len()),
            chunk_len: header.chunk_len(),
            plaintext_len: 0,
        })
    }

    /// Returns the number of plaintext bytes accepted so far.
    pub fn plaintext_len(&self) -> u64 {
        self.plaintext_len
    }

    fn seal_next(&mut self) -> io::Result<()> {
        let sealed = self
            .stream
            .encrypt_next(Payload {
                msg: &self.buffer,
                aad: &self.aad,
            })
            .map_err(|_| io::Error::other("chunk encryption failed"))?;
        self.inner.write_all(&sealed)?;
        self.buffer.clear();
        Ok(())
    }

    /// Seals the final chunk and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let sealed = self
            .stream
            .encrypt_last(Payload {
                msg: &self.buffer,
                aad: &self.aad,
            })
            .map_err(|_| io::Error::other("chunk encryption failed"))?;
        self.inner.write_all(&sealed)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for PartEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            if self.buffer.len() == self.chunk_len {
                self.seal_next()?;
            }
            let take = (self.chunk_len - self.buffer.len()).min(rest.len());
            self.buffer.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
        }
        self.plaintext_len += buf.len() as u64;
        Ok(buf.len())
    }

    /// Flushes the inner writer. Buffered plaintext stays buffered until its
    /// chunk is complete.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Returns the size of an encrypted part holding `plaintext_len` bytes with
/// the default chunk size.
pub fn encrypted_len(plaintext_len: u64) -> u64 {
    encrypted_len_with(plaintext_len, DEFAULT_CHUNK_LOG2)
}

/// Returns the size of an encrypted part with chunks of 2^`chunk_log2` bytes.
pub fn encrypted_len_with(plaintext_len: u64, chunk_log2: u8) -> u64 {
    let chunks = plaintext_len.div_ceil(1u64 << chunk_log2).max(1);
    HEADER_LEN as u64 + plaintext_len + chunks * TAG_LEN as u64
}

fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn auth_failure() -> Error {
    Error::CryptoError("authentication failed: wrong passphrase, corrupted or truncated part".into())
}

/// Decrypts an encrypted part from `input` into `output`.
///
/// Plaintext of a chunk is written only after the chunk authenticates, but a
/// failure in a later chunk leaves the earlier chunks' plaintext in `output`;
/// callers writing to a file should discard it on error.
///
/// Returns the number of plaintext bytes written.
///
/// # Errors
///
/// - [`Error::CryptoError`] for a malformed header or failed authentication
/// - [`Error::ResourceLimitExceeded`] if the header demands excessive key
///   derivation cost
/// - [`Error::Io`] if reading or writing fails
///
/// # Example
///
/// ```rust,no_run
/// use offsite::crypto::{Passphrase, decrypt_part};
/// use std::fs::File;
///
/// let part = File::open("/mnt/dvd/home.0.20240101.tar.bz2.01of02.ofsp")?;
/// let restored = File::create("/tmp/home.0.20240101.tar.bz2.01")?;
/// decrypt_part(part, restored, &Passphrase::new("secret"))?;
/// # Ok::<(), offsite::Error>(())
/// ```
pub fn decrypt_part<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    passphrase: &Passphrase,
) -> Result<u64> {
    let mut aad = [0u8; HEADER_LEN];
    let header_len = read_full(&mut input, &mut aad)?;
    let header = PartHeader::parse(&aad[..header_len])?;
    let key = derive_key(passphrase, &header.salt, &header.kdf)?;
    let mut stream = DecryptorBE32::<Aes256Gcm>::new(
        Key::<Aes256Gcm>::from_slice(&key[..]),
        GenericArray::from_slice(&header.nonce_prefix),
    );

    let sealed_len = header.chunk_len() + TAG_LEN;
    // One byte of lookahead tells a middle chunk from the last one
    let mut buf = vec![0u8; sealed_len + 1];
    let mut filled = read_full(&mut input, &mut buf)?;
    let mut written = 0u64;

    while filled == buf.len() {
        let plain = stream
            .decrypt_next(Payload {
                msg: &buf[..sealed_len],
                aad: &aad,
            })
            .map_err(|_| auth_failure())?;
        output.write_all(&plain)?;
        written += plain.len() as u64;

        buf[0] = buf[sealed_len];
        filled = 1 + read_full(&mut input, &mut buf[1..])?;
    }

    let plain = stream
        .decrypt_last(Payload {
            msg: &buf[..filled],
            aad: &aad,
        })
        .map_err(|_| auth_failure())?;
    output.write_all(&plain)?;
    output.flush()?;
    Ok(written + plain.len() as u64)
}
