//! Command implementations for the CLI tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use offsite::progress::{format_bytes_per_second_iec, format_duration};
use offsite::select::{select_offsite, selection_paths};
use offsite::{AesPartCipher, AtomicProgress, GpgPartCipher, PackOptions, Packer, PartCipher};

use crate::config::{FileConfig, Inputs, Settings};
use crate::exit_codes::{ExitCode, error_to_exit_code, report_to_exit_code};
use crate::output::create_formatter;
use crate::password::prompt_passphrase;
use crate::progress::CliProgress;
use crate::{CipherKind, OutputFormat, PackArgs};

/// Configuration for the pack and plan commands.
pub struct RunConfig<'a> {
    pub args: &'a PackArgs,
    /// `plan`: always a dry run, always prints the layout.
    pub plan_only: bool,
    pub format: OutputFormat,
    pub quiet: bool,
    pub cancel: Arc<AtomicProgress>,
}

/// Pack command implementation, also used for `plan`
pub fn pack(config: &RunConfig<'_>) -> ExitCode {
    let formatter = create_formatter(config.format);

    let file_config = match &config.args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::BadArgs;
            }
        },
        None => FileConfig::default(),
    };
    let settings = match Settings::resolve(config.args, file_config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::BadArgs;
        }
    };
    let dry_run = config.plan_only || settings.dry_run;

    let files = match resolve_inputs(&settings.inputs) {
        Ok(files) => files,
        Err(code) => return code,
    };
    if files.is_empty() {
        if !config.quiet {
            eprintln!("No archives to pack");
        }
        return ExitCode::Success;
    }

    let mut options = PackOptions::new(&settings.work_dir, settings.limits)
        .dry_run(dry_run)
        .threads(settings.threads);
    match settings.passphrase.clone() {
        Some(source) => options = options.passphrase(source),
        None if !dry_run => match prompt_passphrase(true) {
            Ok(source) => options = options.passphrase(source),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FatalError;
            }
        },
        None => {}
    }

    let cipher: Box<dyn PartCipher> = match settings.cipher {
        CipherKind::Aes => Box::new(AesPartCipher::new()),
        CipherKind::Gpg => Box::new(GpgPartCipher::new()),
    };
    log::debug!("Using {} encryption", cipher.name());
    let packer = Packer::with_cipher(options, cipher);

    let hide_progress = config.quiet || dry_run || config.format == OutputFormat::Json;
    let mut progress = CliProgress::new(Arc::clone(&config.cancel), hide_progress);

    let started = Instant::now();
    let result = packer.pack(&files, &mut progress);
    progress.finish();

    match result {
        Ok(report) => {
            if dry_run {
                print!("{}", formatter.format_plan(&report, &settings.limits));
            } else if !config.quiet || config.format == OutputFormat::Json {
                print!("{}", formatter.format_report(&report));
                if config.format == OutputFormat::Human {
                    println!(
                        "Elapsed:         {} ({})",
                        format_duration(started.elapsed()),
                        format_bytes_per_second_iec(config.cancel.bytes_per_second())
                    );
                }
            }
            if config.format == OutputFormat::Json {
                println!();
            }
            report_to_exit_code(&report)
        }
        Err(e) => {
            // Parts written before the abort stay on disk; show which
            let show = !config.quiet || config.format == OutputFormat::Json;
            if let Some(report) = e.partial_report().filter(|_| show) {
                print!("{}", formatter.format_report(report));
                if config.format == OutputFormat::Json {
                    println!();
                }
            }
            eprintln!("Error: {}", e);
            error_to_exit_code(&e)
        }
    }
}

fn resolve_inputs(inputs: &Inputs) -> Result<Vec<PathBuf>, ExitCode> {
    match inputs {
        Inputs::Files(files) => Ok(files.clone()),
        Inputs::ArchiveDir(dir) => match select_offsite(dir) {
            Ok(selection) => Ok(selection_paths(&selection)),
            Err(e) => {
                eprintln!("Error selecting archives in {}: {}", dir.display(), e);
                Err(error_to_exit_code(&e))
            }
        },
    }
}

/// Select command implementation
pub fn select(dir: &Path, format: OutputFormat) -> ExitCode {
    let formatter = create_formatter(format);

    match select_offsite(dir) {
        Ok(selection) => {
            print!("{}", formatter.format_selection(&selection));
            if format == OutputFormat::Json {
                println!();
            }
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            error_to_exit_code(&e)
        }
    }
}
