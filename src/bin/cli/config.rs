//! Settings for `pack` and `plan`, merged from a TOML file and the command line.
//!
//! ```toml
//! work_dir = "/srv/offsite"
//! media = "dvd"
//! volume_size = "4480MiB"
//! passphrase_file = "/etc/offsite/passphrase"
//! cipher = "gpg"
//! threads = 4
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use offsite::progress::parse_size;
use offsite::{PassphraseSource, VolumeLimits};

use crate::{CipherKind, Media, PackArgs};

/// Contents of a configuration file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub work_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub media: Option<Media>,
    pub volume_size: Option<String>,
    pub max_file_size: Option<String>,
    pub block_size: Option<String>,
    pub passphrase_file: Option<PathBuf>,
    pub passphrase_env: Option<String>,
    pub cipher: Option<CipherKind>,
    pub threads: Option<usize>,
}

impl FileConfig {
    /// Loads configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        toml::from_str(&contents).map_err(|e| format!("invalid config {}: {}", path.display(), e))
    }
}

/// Where the archives to pack come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inputs {
    Files(Vec<PathBuf>),
    ArchiveDir(PathBuf),
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub inputs: Inputs,
    pub work_dir: PathBuf,
    pub limits: VolumeLimits,
    /// `None` means prompt (or nothing at all for a dry run).
    pub passphrase: Option<PassphraseSource>,
    pub dry_run: bool,
    pub cipher: CipherKind,
    pub threads: usize,
}

impl Settings {
    /// Merges command-line arguments over the optional config file.
    pub fn resolve(args: &PackArgs, file: FileConfig) -> Result<Self, String> {
        let inputs = if !args.files.is_empty() {
            Inputs::Files(args.files.clone())
        } else if let Some(dir) = args.archive_dir.clone().or(file.archive_dir) {
            Inputs::ArchiveDir(dir)
        } else {
            return Err("no archives given: list files or pass --archive-dir".into());
        };

        let work_dir = args
            .work_dir
            .clone()
            .or(file.work_dir)
            .ok_or("no work directory: pass --work-dir or set OFFSITE_WORK_DIR")?;

        let limits = resolve_limits(
            args.media.or(file.media),
            args.volume_size.as_deref().or(file.volume_size.as_deref()),
            args.max_file_size.as_deref().or(file.max_file_size.as_deref()),
            args.block_size.as_deref().or(file.block_size.as_deref()),
        )?;

        // A source named on the command line wins over both config keys
        let passphrase = match (&args.passphrase_file, &args.passphrase_env) {
            (Some(path), _) => Some(PassphraseSource::file(path)),
            (None, Some(var)) => Some(PassphraseSource::env(var)),
            (None, None) => match (file.passphrase_file, file.passphrase_env) {
                (Some(path), _) => Some(PassphraseSource::file(path)),
                (None, Some(var)) => Some(PassphraseSource::env(var)),
                (None, None) => None,
            },
        };

        let threads = match args.threads.or(file.threads).unwrap_or(1) {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };

        Ok(Self {
            inputs,
            work_dir,
            limits,
            passphrase,
            dry_run: args.dry_run,
            cipher: args.cipher.or(file.cipher).unwrap_or_default(),
            threads,
        })
    }
}

/// Builds limits from a media preset with individual sizes overriding it.
///
/// A volume size smaller than the preset's per-file ceiling also lowers that
/// ceiling, unless the ceiling is given explicitly.
pub fn resolve_limits(
    media: Option<Media>,
    volume_size: Option<&str>,
    max_file_size: Option<&str>,
    block_size: Option<&str>,
) -> Result<VolumeLimits, String> {
    let preset: VolumeLimits = media.map(Into::into).unwrap_or_default();
    let parse = |s: &str| parse_size(s).map_err(|e| e.to_string());

    let capacity = volume_size.map(parse).transpose()?.unwrap_or(preset.volume_capacity);
    let max_file_size = match max_file_size {
        Some(s) => parse(s)?,
        None => preset.max_file_size.min(capacity),
    };
    let block_size = block_size.map(parse).transpose()?.unwrap_or(preset.block_size);

    VolumeLimits::new(capacity, max_file_size, block_size).map_err(|e| e.to_string())
}
