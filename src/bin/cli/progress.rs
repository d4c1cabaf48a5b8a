//! Progress bar for packing runs.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

use offsite::{AtomicProgress, PackProgress, PartRecord};

/// Progress display for `pack`, counting parts.
///
/// Cancellation is read from the shared [`AtomicProgress`] that the Ctrl+C
/// handler flips.
pub struct CliProgress {
    bar: ProgressBar,
    shared: Arc<AtomicProgress>,
}

impl CliProgress {
    /// Creates a new progress display
    pub fn new(shared: Arc<AtomicProgress>, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(0);
            let bar_style = ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} parts ({eta}) {wide_msg}",
                )
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(bar_style);
            pb
        };

        Self { bar, shared }
    }

    /// Finishes the progress display
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PackProgress for CliProgress {
    fn on_total(&mut self, total_parts: u64, total_bytes: u64) {
        self.shared.on_total(total_parts, total_bytes);
        self.bar.set_length(total_parts);
    }

    fn on_file_start(&mut self, path: &Path, _size: u64, _total_parts: u32) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.bar.set_message(name);
    }

    fn on_volume_opened(&mut self, volume: u32) {
        self.bar.println(format!("{} volume {}", style("Opened").cyan(), volume));
    }

    fn on_part_complete(&mut self, record: &PartRecord, success: bool) {
        self.shared.on_part_complete(record, success);
        if !success {
            self.bar.println(format!(
                "{} part {}/{} of {}",
                style("Failed").red(),
                record.part_index,
                record.total_parts,
                record.source.display()
            ));
        }
        self.bar.inc(1);
    }

    fn on_warning(&mut self, message: &str) {
        self.bar.println(format!("{} {}", style("Warning:").yellow(), message));
    }

    fn should_cancel(&self) -> bool {
        self.shared.should_cancel()
    }
}
