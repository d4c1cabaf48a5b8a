//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use rand::{Rng, SeedableRng};

use offsite::crypto::{KdfParams, NoncePolicy, Passphrase, decrypt_part};
use offsite::{AesPartCipher, GpgPartCipher, PartCipher, RangeRequest, VolumeLimits};

/// Key derivation cost used by tests; the default would make them slow.
pub const TEST_KDF: KdfParams = KdfParams::new(8, 1, 1);

/// Passphrase shared by the test runs.
pub const PASSPHRASE: &str = "correct horse battery staple";

/// Limits used by most tests: 10000-byte volumes, 100-byte blocks.
pub fn small_limits() -> VolumeLimits {
    VolumeLimits::new(10_000, 10_000, 100).unwrap()
}

/// AES cipher with a cheap key derivation.
pub fn fast_cipher() -> AesPartCipher {
    AesPartCipher::with_nonce_policy(NoncePolicy::random_with_kdf(TEST_KDF))
}

/// Writes `size` bytes of seeded random data to `dir/name`.
pub fn random_file(dir: &Path, name: &str, size: usize, seed: u64) -> (PathBuf, Vec<u8>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let data: Vec<u8> = (0..size).map(|_| rng.r#gen()).collect();
    let path = dir.join(name);
    fs::write(&path, &data).unwrap();
    (path, data)
}

/// Writes a passphrase file and returns its path.
pub fn passphrase_file(dir: &Path) -> PathBuf {
    let path = dir.join("passphrase");
    fs::write(&path, format!("{}\n", PASSPHRASE)).unwrap();
    path
}

/// Decrypts a part written by [`AesPartCipher`].
pub fn decrypt(part: &[u8], passphrase: &str) -> Vec<u8> {
    let mut plain = Vec::new();
    decrypt_part(part, &mut plain, &Passphrase::new(passphrase)).unwrap();
    plain
}

/// Returns `true` if a `gpg` binary can be run.
pub fn gpg_available() -> bool {
    Command::new("gpg")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// gpg backend keeping its state in `home` instead of the user's keyring.
pub fn gpg_cipher(home: &Path) -> GpgPartCipher {
    GpgPartCipher::new().arg("--homedir").arg(home)
}

/// Decrypts a `.gpg` part with the gpg binary.
pub fn gpg_decrypt(home: &Path, part: &Path, passphrase: &str) -> Vec<u8> {
    let mut child = Command::new("gpg")
        .arg("--homedir")
        .arg(home)
        .args(["--batch", "--quiet", "--no-tty", "--pinentry-mode", "loopback"])
        .args(["--passphrase-fd", "0", "--decrypt"])
        .arg(part)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(format!("{}\n", passphrase).as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "gpg --decrypt failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout
}

/// Lists `dir` recursively as sorted paths relative to it.
pub fn tree(dir: &Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|e| {
            e.unwrap()
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    entries.sort();
    entries
}

/// A cipher that records requests instead of encrypting.
#[derive(Default)]
pub struct RecordingCipher {
    pub requests: Mutex<Vec<RangeRequest>>,
}

impl RecordingCipher {
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl PartCipher for RecordingCipher {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn encrypt(&self, request: &RangeRequest, _passphrase: &Passphrase) -> offsite::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}
