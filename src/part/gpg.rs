//! Part encryption through an external `gpg` process.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{PartCipher, RangeRequest, range};
use crate::crypto::Passphrase;
use crate::Result;

/// Encrypts parts by piping the byte range into `gpg --symmetric`.
///
/// The passphrase goes in as the first line of stdin (`--passphrase-fd 0`),
/// so it never appears on a command line. Compression is disabled since the
/// sources are already compressed archives. The resulting `.gpg` files are
/// standard OpenPGP messages: `gpg --decrypt` restores each range.
#[derive(Debug, Clone)]
pub struct GpgPartCipher {
    program: PathBuf,
    extra_args: Vec<OsString>,
}

impl Default for GpgPartCipher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gpg"),
            extra_args: Vec::new(),
        }
    }
}

impl GpgPartCipher {
    /// Uses `gpg` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific gpg binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends arguments passed before the fixed ones (e.g. `--cipher-algo AES256`).
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn command(&self, output: &std::path::Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.extra_args)
            .args([
                "--batch",
                "--quiet",
                "--no-tty",
                "--symmetric",
                "--compress-algo",
                "none",
                "--pinentry-mode",
                "loopback",
                "--passphrase-fd",
                "0",
                "--output",
            ])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }

    fn run(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()> {
        let mut reader = request.open()?;
        let partial = request.partial_path();

        // gpg --batch refuses to replace an existing output file
        match std::fs::remove_file(&partial) {
            Ok(()) => log::warn!("Removed stale {}", partial.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(request.error(e)),
        }

        let mut child = self.command(&partial).spawn().map_err(|e| {
            request.error(format!("cannot run {}: {}", self.program.display(), e))
        })?;

        let piped = match child.stdin.take() {
            Some(mut stdin) => (|| -> io::Result<u64> {
                stdin.write_all(passphrase.as_bytes())?;
                stdin.write_all(b"\n")?;
                let copied = io::copy(&mut reader, &mut stdin)?;
                stdin.flush()?;
                Ok(copied)
            })(),
            None => Err(io::Error::other("gpg stdin unavailable")),
        };

        let output = child.wait_with_output().map_err(|e| request.error(e))?;
        if !output.status.success() {
            let _ = std::fs::remove_file(&partial);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(request.error(format!(
                "gpg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let copied = piped.map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            request.error(e)
        })?;
        reader.check_complete(copied).map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            request.error(e)
        })?;
        Ok(())
    }
}

impl PartCipher for GpgPartCipher {
    fn name(&self) -> &'static str {
        "gpg"
    }

    fn encrypt(&self, request: &RangeRequest, passphrase: &Passphrase) -> Result<()> {
        self.run(request, passphrase)?;
        range::commit(&request.partial_path(), &request.destination).map_err(|e| request.error(e))
    }
}
