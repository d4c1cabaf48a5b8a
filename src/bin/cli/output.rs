//! Output formatting for CLI operations.

use serde_json::json;

use offsite::progress::format_bytes_iec;
use offsite::select::SelectedArchive;
use offsite::{PackReport, PartRecord, VolumeLimits};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the per-volume layout of a run
    fn format_plan(&self, report: &PackReport, limits: &VolumeLimits) -> String;

    /// Formats the summary of a finished run
    fn format_report(&self, report: &PackReport) -> String;

    /// Formats an archive selection
    fn format_selection(&self, selection: &[SelectedArchive]) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_plan(&self, report: &PackReport, limits: &VolumeLimits) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Volume size {}, file ceiling {}, block {}\n",
            format_bytes_iec(limits.volume_capacity),
            format_bytes_iec(limits.max_file_size),
            format_bytes_iec(limits.block_size)
        ));

        for volume in 1..=report.volumes_created {
            let parts: Vec<&PartRecord> = report.parts_in_volume(volume).collect();
            let used: u64 = parts.iter().map(|p| p.length).sum();
            output.push('\n');
            output.push_str(&format!(
                "Volume {} ({} used, {} free)\n",
                volume,
                format_bytes_iec(used),
                format_bytes_iec(limits.volume_capacity.saturating_sub(used))
            ));
            output.push_str(&"-".repeat(70));
            output.push('\n');
            for part in parts {
                output.push_str(&format!(
                    "{:>12}  {}\n",
                    format_bytes_iec(part.length),
                    part.destination
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ));
            }
        }

        output.push('\n');
        output.push_str(&format!(
            "{} part(s) on {} volume(s), {} total\n",
            report.parts.len(),
            report.volumes_created,
            format_bytes_iec(report.bytes_packed())
        ));
        for skipped in &report.skipped {
            output.push_str(&format!("Skipped {}: {}\n", skipped.path.display(), skipped.reason));
        }
        for failure in &report.failures {
            output.push_str(&format!(
                "Conflict {}: {}\n",
                failure.part.destination.display(),
                failure.error
            ));
        }

        output
    }

    fn format_report(&self, report: &PackReport) -> String {
        let mut output = String::new();

        output.push_str(&format!("Volumes created: {}\n", report.volumes_created));
        output.push_str(&format!(
            "Parts written:   {} ({})\n",
            report.parts.len(),
            format_bytes_iec(report.bytes_packed())
        ));
        output.push_str(&format!("Parts failed:    {}\n", report.failures.len()));
        if !report.skipped.is_empty() {
            output.push_str(&format!("Files skipped:   {}\n", report.skipped.len()));
        }

        if !report.failures.is_empty() {
            output.push_str("\nFailures:\n");
            for failure in &report.failures {
                output.push_str(&format!(
                    "  {} (part {}/{}): {}\n",
                    failure.part.source.display(),
                    failure.part.part_index,
                    failure.part.total_parts,
                    failure.error
                ));
            }
        }
        if !report.skipped.is_empty() {
            output.push_str("\nSkipped:\n");
            for skipped in &report.skipped {
                output.push_str(&format!("  {}: {}\n", skipped.path.display(), skipped.reason));
            }
        }
        if report.cancelled {
            output.push_str("\nCancelled before all parts were written.\n");
        }

        output
    }

    fn format_selection(&self, selection: &[SelectedArchive]) -> String {
        if selection.is_empty() {
            return "No archives selected.\n".to_string();
        }

        let mut output = String::new();
        output.push_str(&format!("{:<20} {:>5} {}\n", "Filesystem", "Level", "Archive"));
        output.push_str(&"-".repeat(70));
        output.push('\n');
        for archive in selection {
            output.push_str(&format!(
                "{:<20} {:>5} {}\n",
                archive.name.filesystem,
                archive.name.level,
                archive.path.display()
            ));
        }
        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

fn part_json(part: &PartRecord) -> serde_json::Value {
    json!({
        "source": part.source.display().to_string(),
        "volume": part.volume,
        "destination": part.destination.display().to_string(),
        "part": part.part_index,
        "parts": part.total_parts,
        "offset": part.offset,
        "length": part.length,
        "to_eof": part.to_eof,
    })
}

fn report_json(report: &PackReport) -> serde_json::Value {
    json!({
        "success": report.is_ok(),
        "dry_run": report.dry_run,
        "cancelled": report.cancelled,
        "volumes_created": report.volumes_created,
        "bytes_packed": report.bytes_packed(),
        "parts": report.parts.iter().map(part_json).collect::<Vec<_>>(),
        "failures": report.failures.iter().map(|f| json!({
            "part": part_json(&f.part),
            "error": f.error,
        })).collect::<Vec<_>>(),
        "skipped": report.skipped.iter().map(|s| json!({
            "path": s.path.display().to_string(),
            "reason": s.reason,
        })).collect::<Vec<_>>(),
    })
}

impl OutputFormatter for JsonFormatter {
    fn format_plan(&self, report: &PackReport, limits: &VolumeLimits) -> String {
        let mut obj = report_json(report);
        obj["limits"] = json!({
            "volume_capacity": limits.volume_capacity,
            "max_file_size": limits.max_file_size,
            "block_size": limits.block_size,
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_report(&self, report: &PackReport) -> String {
        serde_json::to_string_pretty(&report_json(report)).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_selection(&self, selection: &[SelectedArchive]) -> String {
        let items: Vec<_> = selection
            .iter()
            .map(|a| {
                json!({
                    "path": a.path.display().to_string(),
                    "filesystem": a.name.filesystem,
                    "level": a.name.level,
                    "timestamp": a.name.timestamp,
                    "modified": a.modified.unix_seconds(),
                })
            })
            .collect();

        serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}
