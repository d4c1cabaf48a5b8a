//! Passphrase handling for part encryption.

use zeroize::Zeroizing;

/// A passphrase shared by every part of a packing run.
///
/// The contents are wiped from memory on drop, and [`Debug`] output only
/// reveals the length, so a passphrase can be carried through logged
/// structures without leaking.
#[derive(Clone)]
pub struct Passphrase {
    inner: Zeroizing<String>,
}

impl Passphrase {
    /// Creates a new passphrase from a string.
    pub fn new<S: Into<String>>(passphrase: S) -> Self {
        Self {
            inner: Zeroizing::new(passphrase.into()),
        }
    }

    /// Creates a passphrase from the first line of a secret file's contents.
    ///
    /// Trailing `\r\n` / `\n` is stripped, matching how line-oriented tools
    /// read passphrase files. Everything after the first line is ignored.
    pub fn from_first_line(contents: &str) -> Self {
        let line = contents.lines().next().unwrap_or("");
        Self::new(line)
    }

    /// Returns the passphrase as UTF-8 bytes for key derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Returns the passphrase as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns true if the passphrase is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the length of the passphrase in characters.
    pub fn len(&self) -> usize {
        self.inner.chars().count()
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the actual passphrase in debug output
        f.debug_struct("Passphrase")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Passphrase {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
