//! CLI tool for packing backup archives onto offsite volumes.

mod commands;
mod config;
mod exit_codes;
mod output;
mod password;
mod progress;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use exit_codes::ExitCode;
use offsite::AtomicProgress;

/// Split backup archives into encrypted, media-sized volumes
#[derive(Parser)]
#[command(name = "offsite")]
#[command(author, version, about = "Split backup archives into encrypted, media-sized volumes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Split and encrypt archives into volume directories (alias: p)
    #[command(alias = "p")]
    Pack(PackArgs),

    /// Show the volume plan without writing anything
    Plan(PackArgs),

    /// List the archives that would go offsite
    Select {
        /// Directory holding the backup archives
        dir: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments shared by `pack` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct PackArgs {
    /// Archives to pack, in order
    files: Vec<PathBuf>,

    /// Select the archives from this directory instead of listing them
    #[arg(long, short = 'a', conflicts_with = "files")]
    archive_dir: Option<PathBuf>,

    /// Directory receiving the numbered volume directories
    #[arg(long, short = 'w', env = "OFFSITE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Media preset providing default sizes
    #[arg(long, short = 'm', value_enum)]
    media: Option<Media>,

    /// Capacity of one volume (e.g. 700M, 4480MiB, 23G)
    #[arg(long, env = "OFFSITE_VOLUME_SIZE")]
    volume_size: Option<String>,

    /// Largest single output file
    #[arg(long, env = "OFFSITE_MAX_FILE_SIZE")]
    max_file_size: Option<String>,

    /// Alignment of every capped part
    #[arg(long, env = "OFFSITE_BLOCK_SIZE")]
    block_size: Option<String>,

    /// Read the passphrase from the first line of this file
    #[arg(long, env = "OFFSITE_PASSPHRASE_FILE", conflicts_with = "passphrase_env")]
    passphrase_file: Option<PathBuf>,

    /// Read the passphrase from this environment variable
    #[arg(long)]
    passphrase_env: Option<String>,

    /// Place and name parts without writing anything
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Encryption backend
    #[arg(long, value_enum)]
    cipher: Option<CipherKind>,

    /// Number of encryption threads (0 = one per CPU)
    #[arg(long, short = 't')]
    threads: Option<usize>,

    /// TOML configuration file; flags take precedence over its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Media {
    Cd,
    Dvd,
    DvdDl,
    Bluray,
}

impl From<Media> for offsite::VolumeLimits {
    fn from(media: Media) -> Self {
        match media {
            Media::Cd => offsite::VolumeLimits::cd(),
            Media::Dvd => offsite::VolumeLimits::dvd(),
            Media::DvdDl => offsite::VolumeLimits::dvd_dl(),
            Media::Bluray => offsite::VolumeLimits::bluray(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherKind {
    /// External `gpg --symmetric`, writes standard `.gpg` files
    #[default]
    Gpg,
    /// In-process AES-256-GCM, writes `.ofsp` files
    Aes,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// First Ctrl+C asks the running pack to stop between parts, the second
/// exits immediately.
fn install_interrupt_handler(cancel: Arc<AtomicProgress>) {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("\nInterrupted");
            std::process::exit(exit_codes::USER_INTERRUPT);
        }
        eprintln!("\nStopping after the current part (Ctrl+C again to abort)");
        cancel.cancel();
    })
    .ok();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = AtomicProgress::shared();
    install_interrupt_handler(Arc::clone(&cancel));

    let exit_code = match cli.command {
        Commands::Pack(args) => commands::pack(&commands::RunConfig {
            args: &args,
            plan_only: false,
            format: cli.format,
            quiet: cli.quiet,
            cancel,
        }),

        Commands::Plan(args) => commands::pack(&commands::RunConfig {
            args: &args,
            plan_only: true,
            format: cli.format,
            quiet: cli.quiet,
            cancel,
        }),

        Commands::Select { dir } => commands::select(&dir, cli.format),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
