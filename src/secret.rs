//! Where the run's passphrase comes from.
//!
//! The passphrase is never held by the packing driver itself. Each part's
//! encryption step asks its [`PassphraseSource`] for the passphrase exactly
//! once, uses it, and drops it.

use std::path::{Path, PathBuf};

use crate::crypto::Passphrase;
use crate::{Error, Result};

/// A designated secret source for the shared passphrase.
#[derive(Debug, Clone)]
pub enum PassphraseSource {
    /// First line of a file, typically readable only by the backup user.
    File(PathBuf),
    /// Value of an environment variable.
    Env(String),
    /// A passphrase already held in memory (interactive prompt, tests).
    Inline(Passphrase),
}

impl PassphraseSource {
    /// Creates a file-backed source.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Creates an environment-variable source.
    pub fn env(name: impl Into<String>) -> Self {
        Self::Env(name.into())
    }

    /// Reads the passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Passphrase`] if the source cannot be read or yields an
    /// empty passphrase. The message names the source, never the secret.
    pub fn read(&self) -> Result<Passphrase> {
        let passphrase = match self {
            Self::File(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    Error::Passphrase(format!("cannot read {}: {}", path.display(), e))
                })?;
                Passphrase::from_first_line(&contents)
            }
            Self::Env(name) => {
                let value = std::env::var(name).map_err(|e| {
                    Error::Passphrase(format!("environment variable {}: {}", name, e))
                })?;
                Passphrase::new(value)
            }
            Self::Inline(passphrase) => passphrase.clone(),
        };

        if passphrase.is_empty() {
            return Err(Error::Passphrase(format!("{} is empty", self.describe())));
        }
        Ok(passphrase)
    }

    /// Returns a description of the source suitable for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => format!("passphrase file {}", path.display()),
            Self::Env(name) => format!("environment variable {}", name),
            Self::Inline(_) => "inline passphrase".to_string(),
        }
    }
}

impl From<Passphrase> for PassphraseSource {
    fn from(passphrase: Passphrase) -> Self {
        Self::Inline(passphrase)
    }
}
