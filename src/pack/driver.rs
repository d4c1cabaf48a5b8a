//! The packing driver.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::report::{PackReport, PartFailure, PartRecord, SkippedFile};
use crate::crypto::Passphrase;
use crate::part::{GpgPartCipher, PartCipher, RangeRequest, encrypt_range};
use crate::progress::{PackProgress, format_bytes_iec};
use crate::secret::PassphraseSource;
use crate::volume::{
    VolumeAllocator, VolumeConfig, VolumeLimits, part_file_name_with, predict_parts, step_once,
};
use crate::{Error, Result};

/// Options for a packing run.
///
/// # Example
///
/// ```rust
/// use offsite::volume::VolumeLimits;
/// use offsite::{PackOptions, PassphraseSource};
///
/// let options = PackOptions::new("/srv/offsite", VolumeLimits::dvd())
///     .passphrase(PassphraseSource::file("/etc/offsite/passphrase"))
///     .threads(4);
/// assert!(!options.dry_run);
/// ```
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Directory receiving the `<n>/` volume directories.
    pub work_dir: PathBuf,
    /// Size ceilings.
    pub limits: VolumeLimits,
    /// Where each part's passphrase is read from.
    pub passphrase: Option<PassphraseSource>,
    /// Plan only: no directories, no files, no passphrase reads.
    pub dry_run: bool,
    /// Worker threads for encryption. 1 keeps everything sequential.
    pub threads: usize,
}

impl PackOptions {
    /// Creates options with no passphrase source, sequential encryption.
    pub fn new(work_dir: impl AsRef<Path>, limits: VolumeLimits) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            limits,
            passphrase: None,
            dry_run: false,
            threads: 1,
        }
    }

    /// Sets the passphrase source.
    pub fn passphrase(mut self, source: impl Into<PassphraseSource>) -> Self {
        self.passphrase = Some(source.into());
        self
    }

    /// Enables or disables dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the number of encryption threads (0 is treated as 1).
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}

/// A source file with its size snapshot.
#[derive(Debug, Clone)]
struct InputFile {
    path: PathBuf,
    size: u64,
}

/// A placed part waiting to be encrypted.
#[derive(Debug)]
struct PartJob {
    record: PartRecord,
    request: RangeRequest,
}

/// Splits, places and encrypts files onto volumes.
///
/// Files are processed strictly in the given order. Each file is cut into
/// parts that respect the per-file ceiling and the space left on the current
/// volume; a new volume directory is opened whenever fewer than one block is
/// left.
///
/// # Example
///
/// ```rust,no_run
/// use offsite::progress::NoProgress;
/// use offsite::volume::VolumeLimits;
/// use offsite::{PackOptions, Packer, PassphraseSource};
///
/// let options = PackOptions::new("/srv/offsite", VolumeLimits::dvd())
///     .passphrase(PassphraseSource::env("OFFSITE_PASSPHRASE"));
/// let report = Packer::new(options).pack(
///     &["/backups/home.0.20240101.tar.bz2", "/backups/home.1.20240108.tar.bz2"],
///     &mut NoProgress,
/// )?;
/// println!("{} volume(s), {} part(s)", report.volumes_created, report.parts.len());
/// # Ok::<(), offsite::Error>(())
/// ```
#[derive(Debug)]
pub struct Packer<C = GpgPartCipher> {
    options: PackOptions,
    cipher: C,
}

impl Packer<GpgPartCipher> {
    /// Creates a packer that encrypts with `gpg --symmetric`.
    pub fn new(options: PackOptions) -> Self {
        Self::with_cipher(options, GpgPartCipher::new())
    }
}

impl<C: PartCipher> Packer<C> {
    /// Creates a packer with a specific encryption backend.
    pub fn with_cipher(options: PackOptions, cipher: C) -> Self {
        Self { options, cipher }
    }

    /// Returns the options.
    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Packs `files` in order and returns the run's report.
    ///
    /// Part failures, destination collisions and unreadable files are
    /// recorded in the report and do not stop the run.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLimits`] if the limits are inconsistent
    /// - [`Error::Passphrase`] if no passphrase source is set outside dry run
    /// - [`Error::VolumeCreate`] if a volume directory cannot be created. Parts
    ///   placed before that point are still written, also with several
    ///   threads, and [`Error::partial_report`] returns the report so far
    pub fn pack<F, P>(&self, files: &[F], progress: &mut P) -> Result<PackReport>
    where
        F: AsRef<Path>,
        P: PackProgress,
    {
        let limits = self.options.limits;
        limits.validate()?;
        let passphrase = self.passphrase_source()?;
        let dry_run = self.options.dry_run;

        let mut report = PackReport {
            dry_run,
            ..Default::default()
        };

        let inputs = probe(files, &mut report, progress);
        let (total_parts, total_bytes) = plan_totals(&inputs, &limits);
        progress.on_total(total_parts, total_bytes);
        log::info!(
            "Packing {} file(s), {} in {} part(s){}",
            inputs.len(),
            format_bytes_iec(total_bytes),
            total_parts,
            if dry_run { " (dry run)" } else { "" }
        );

        let mut allocator =
            VolumeAllocator::new(VolumeConfig::new(&self.options.work_dir, limits), dry_run);
        let mut claimed: HashSet<String> = HashSet::new();
        let threads = self.worker_threads();
        let extension = self.cipher.extension();
        let mut jobs = Vec::new();
        let mut fatal = None;

        'files: for input in &inputs {
            let parts = match predict_parts(input.size, &limits, allocator.bytes_available_now()) {
                Ok(parts) => parts,
                Err(e) => {
                    skip(&mut report, progress, &input.path, e.to_string());
                    continue;
                }
            };
            if parts == 0 {
                let message = format!("{} is empty, nothing to pack", input.path.display());
                log::warn!("{}", message);
                progress.on_warning(&message);
                continue;
            }
            progress.on_file_start(&input.path, input.size, parts);

            let mut offset = 0u64;
            for part_index in 1..=parts {
                if progress.should_cancel() {
                    log::warn!("Cancellation requested, stopping before next part");
                    report.cancelled = true;
                    break 'files;
                }

                match allocator.ensure_capacity() {
                    Ok(true) => {
                        claimed.clear();
                        progress.on_volume_opened(allocator.volumes_opened());
                    }
                    Ok(false) => {}
                    Err(e) => {
                        fatal = Some(e);
                        break 'files;
                    }
                }

                let reservation = allocator.reserve(input.size - offset);
                let name = part_file_name_with(&input.path, part_index, parts, extension);
                let job = PartJob {
                    record: PartRecord {
                        source: input.path.clone(),
                        volume: allocator.volumes_opened(),
                        destination: allocator.current_dir().join(&name),
                        part_index,
                        total_parts: parts,
                        offset,
                        length: reservation.copy_bytes,
                        to_eof: reservation.to_eof,
                    },
                    request: RangeRequest {
                        source: input.path.clone(),
                        destination: allocator.current_dir().join(&name),
                        block_size: limits.block_size,
                        offset_blocks: offset / limits.block_size,
                        copy_blocks: if reservation.to_eof {
                            0
                        } else {
                            reservation.copy_bytes / limits.block_size
                        },
                    },
                };
                offset += reservation.copy_bytes;

                if !claimed.insert(name) {
                    let error = Error::DestinationExists {
                        path: job.record.destination.clone(),
                    };
                    progress.on_part_complete(&job.record, false);
                    record_outcome(&mut report, job.record, Err(error));
                    continue;
                }

                if threads > 1 {
                    jobs.push(job);
                } else {
                    let outcome = encrypt_range(&self.cipher, &job.request, &passphrase, dry_run);
                    progress.on_part_complete(&job.record, outcome.is_ok());
                    record_outcome(&mut report, job.record, outcome);
                }
            }
            debug_assert_eq!(offset, input.size);
        }

        // Parts placed before a fatal error are still written
        if !jobs.is_empty() {
            self.run_parallel(jobs, &passphrase, threads, &mut report, progress)?;
        }

        report.volumes_created = allocator.volumes_opened();
        if let Some(error) = fatal {
            log::error!(
                "Packing aborted after {} part(s) in {} volume(s): {}",
                report.parts.len(),
                report.volumes_created,
                error
            );
            return Err(attach_report(error, report));
        }
        log::info!(
            "Packed {} part(s) into {} volume(s), {} failed, {} skipped{}",
            report.parts.len(),
            report.volumes_created,
            report.failures.len(),
            report.skipped.len(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    fn passphrase_source(&self) -> Result<PassphraseSource> {
        match (&self.options.passphrase, self.options.dry_run) {
            (Some(source), _) => Ok(source.clone()),
            // Never read in dry run
            (None, true) => Ok(PassphraseSource::Inline(Passphrase::new(""))),
            (None, false) => Err(Error::Passphrase(
                "no passphrase source configured".into(),
            )),
        }
    }

    #[cfg(feature = "parallel")]
    fn worker_threads(&self) -> usize {
        self.options.threads.max(1)
    }

    #[cfg(not(feature = "parallel"))]
    fn worker_threads(&self) -> usize {
        if self.options.threads > 1 {
            log::warn!("Built without the parallel feature, encrypting sequentially");
        }
        1
    }

    /// Encrypts already placed parts on a worker pool.
    ///
    /// Outcomes are merged into the report in placement order.
    #[cfg(feature = "parallel")]
    fn run_parallel<P: PackProgress>(
        &self,
        jobs: Vec<PartJob>,
        passphrase: &PassphraseSource,
        threads: usize,
        report: &mut PackReport,
        progress: &mut P,
    ) -> Result<()> {
        use rayon::prelude::*;
        use std::sync::Mutex;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        log::debug!("Encrypting {} part(s) on {} threads", jobs.len(), threads);

        let progress = Mutex::new(progress);
        let dry_run = self.options.dry_run;
        let outcomes: Vec<Option<Result<()>>> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    if progress.lock().unwrap_or_else(|e| e.into_inner()).should_cancel() {
                        return None;
                    }
                    let outcome = encrypt_range(&self.cipher, &job.request, passphrase, dry_run);
                    progress
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .on_part_complete(&job.record, outcome.is_ok());
                    Some(outcome)
                })
                .collect()
        });

        for (job, outcome) in jobs.into_iter().zip(outcomes) {
            match outcome {
                Some(outcome) => record_outcome(report, job.record, outcome),
                None => report.cancelled = true,
            }
        }
        if report.cancelled {
            log::warn!("Cancellation requested, remaining parts were not encrypted");
        }
        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel<P: PackProgress>(
        &self,
        jobs: Vec<PartJob>,
        passphrase: &PassphraseSource,
        _threads: usize,
        report: &mut PackReport,
        progress: &mut P,
    ) -> Result<()> {
        for job in jobs {
            if progress.should_cancel() {
                report.cancelled = true;
                break;
            }
            let outcome = encrypt_range(&self.cipher, &job.request, passphrase, self.options.dry_run);
            progress.on_part_complete(&job.record, outcome.is_ok());
            record_outcome(report, job.record, outcome);
        }
        Ok(())
    }
}

/// Takes the size snapshot of every input, recording unreadable files.
fn probe<F: AsRef<Path>, P: PackProgress>(
    files: &[F],
    report: &mut PackReport,
    progress: &mut P,
) -> Vec<InputFile> {
    let mut inputs = Vec::with_capacity(files.len());
    for file in files {
        let path = file.as_ref();
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => inputs.push(InputFile {
                path: path.to_path_buf(),
                size: meta.len(),
            }),
            Ok(_) => skip(report, progress, path, "not a regular file".to_string()),
            Err(source) => {
                let error = Error::SizeProbe {
                    path: path.to_path_buf(),
                    source,
                };
                skip(report, progress, path, error.to_string());
            }
        }
    }
    inputs
}

fn skip<P: PackProgress>(report: &mut PackReport, progress: &mut P, path: &Path, reason: String) {
    log::error!("Skipping {}: {}", path.display(), reason);
    progress.on_warning(&format!("skipped {}: {}", path.display(), reason));
    report.skipped.push(SkippedFile {
        path: path.to_path_buf(),
        reason,
    });
}

/// Counts the parts and bytes a run will produce without touching any state.
fn plan_totals(inputs: &[InputFile], limits: &VolumeLimits) -> (u64, u64) {
    let mut remaining = limits.volume_capacity;
    let mut parts = 0u64;
    let mut bytes = 0u64;
    for input in inputs {
        // Files the run will skip
        if predict_parts(input.size, limits, remaining).is_err() {
            continue;
        }
        let mut file_remaining = input.size;
        while file_remaining > 0 {
            let step = step_once(remaining, file_remaining, limits);
            file_remaining -= step.consumed;
            remaining = step.remaining;
            parts += 1;
        }
        bytes += input.size;
    }
    (parts, bytes)
}

/// Hands the report of an aborted run to the caller through the error.
fn attach_report(error: Error, report: PackReport) -> Error {
    match error {
        Error::VolumeCreate {
            volume,
            path,
            source,
            ..
        } => Error::VolumeCreate {
            volume,
            path,
            source,
            report: Some(Box::new(report)),
        },
        other => other,
    }
}

fn record_outcome(report: &mut PackReport, record: PartRecord, outcome: Result<()>) {
    match outcome {
        Ok(()) => {
            if !report.dry_run {
                log::info!(
                    "Wrote part {}/{} of {} to {}",
                    record.part_index,
                    record.total_parts,
                    record.source.display(),
                    record.destination.display()
                );
            }
            report.parts.push(record);
        }
        Err(error) => {
            log::error!(
                "Part {}/{} of {} (bytes {}..{}, offset {}) failed: {}",
                record.part_index,
                record.total_parts,
                record.source.display(),
                record.offset,
                record.end(),
                record.offset,
                error
            );
            report.failures.push(PartFailure {
                part: record,
                error: error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, StatisticsProgress};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<RangeRequest>>,
        fail_on: Option<u64>,
    }

    impl PartCipher for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn encrypt(&self, request: &RangeRequest, _passphrase: &Passphrase) -> Result<()> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail_on == Some(request.offset()) {
                return Err(request.error("simulated failure"));
            }
            Ok(())
        }
    }

    fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0xA5u8; size]).unwrap();
        path
    }

    fn options(work: &Path) -> PackOptions {
        PackOptions::new(work, VolumeLimits::new(10_000, 10_000, 100).unwrap())
            .passphrase(Passphrase::new("pw"))
    }

    #[test]
    fn test_spill_over_second_file() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let files = [
            write_file(src.path(), "a.0.t.tar.bz2", 6_000),
            write_file(src.path(), "b.0.t.tar.bz2", 6_000),
        ];
        let recorder = Recorder::default();

        let report = Packer::with_cipher(options(work.path()), &recorder)
            .pack(&files, &mut NoProgress)
            .unwrap();

        assert!(report.is_ok());
        assert_eq!(report.volumes_created, 2);
        let layout: Vec<_> = report
            .parts
            .iter()
            .map(|p| (p.volume, p.offset, p.length, p.to_eof))
            .collect();
        assert_eq!(
            layout,
            vec![(1, 0, 6_000, true), (1, 0, 4_000, false), (2, 4_000, 2_000, true)]
        );
        assert_eq!(
            report.parts[1].destination,
            work.path().join("1").join("b.0.t.tar.bz2.01of02.gpg")
        );

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[1].offset_blocks, 0);
        assert_eq!(calls[1].copy_blocks, 40);
        assert_eq!(calls[2].offset_blocks, 40);
        assert_eq!(calls[2].copy_blocks, 0);
    }

    #[test]
    fn test_part_failure_does_not_stop_run() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let files = [write_file(src.path(), "big.0.t.tar.bz2", 25_000)];
        let recorder = Recorder {
            fail_on: Some(10_000),
            ..Default::default()
        };

        let report = Packer::with_cipher(options(work.path()), &recorder)
            .pack(&files, &mut NoProgress)
            .unwrap();

        assert_eq!(recorder.calls.lock().unwrap().len(), 3);
        assert_eq!(report.parts.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].part.part_index, 2);
        assert!(report.failures[0].error.contains("simulated failure"));
        assert!(!report.is_ok());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let files = [
            src.path().join("missing.0.t.tar.bz2"),
            write_file(src.path(), "ok.0.t.tar.bz2", 500),
        ];
        let recorder = Recorder::default();

        let report = Packer::with_cipher(options(work.path()), &recorder)
            .pack(&files, &mut NoProgress)
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.parts.len(), 1);
        assert_eq!(report.volumes_created, 1);
    }

    #[test]
    fn test_empty_file_produces_no_parts() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let files = [write_file(src.path(), "empty.0.t.tar.bz2", 0)];
        let mut progress = StatisticsProgress::new();

        let report = Packer::with_cipher(options(work.path()), Recorder::default())
            .pack(&files, &mut progress)
            .unwrap();

        assert_eq!(report.volumes_created, 0);
        assert!(report.parts.is_empty());
        assert_eq!(progress.warnings.len(), 1);
    }

    #[test]
    fn test_basename_collision_rejected() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::create_dir(src.path().join("x")).unwrap();
        std::fs::create_dir(src.path().join("y")).unwrap();
        let files = [
            write_file(&src.path().join("x"), "same.0.t.tar.bz2", 100),
            write_file(&src.path().join("y"), "same.0.t.tar.bz2", 100),
        ];
        let recorder = Recorder::default();

        let report = Packer::with_cipher(options(work.path()), &recorder)
            .pack(&files, &mut NoProgress)
            .unwrap();

        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        assert_eq!(report.parts.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("already exists"));
    }

    #[test]
    fn test_cancel_between_parts() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let files = [write_file(src.path(), "big.0.t.tar.bz2", 25_000)];
        let recorder = Recorder::default();
        let mut progress = StatisticsProgress::cancel_after(1);

        let report = Packer::with_cipher(options(work.path()), &recorder)
            .pack(&files, &mut progress)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.parts.len(), 1);
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        assert_eq!(progress.total_parts, 3);
    }

    #[test]
    fn test_missing_passphrase_source_rejected() {
        let work = TempDir::new().unwrap();
        let options = PackOptions::new(work.path(), VolumeLimits::cd());
        let err = Packer::with_cipher(options, Recorder::default())
            .pack::<PathBuf, _>(&[], &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Passphrase(_)));
    }

    #[test]
    fn test_volume_failure_carries_report() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let files = [write_file(src.path(), "big.0.t.tar.bz2", 25_000)];
        std::fs::write(work.path().join("2"), b"").unwrap();

        for threads in [1, 3] {
            let recorder = Recorder::default();
            let err = Packer::with_cipher(options(work.path()).threads(threads), &recorder)
                .pack(&files, &mut NoProgress)
                .unwrap_err();

            assert!(matches!(err, Error::VolumeCreate { volume: 2, .. }));
            let report = err.partial_report().unwrap();
            assert_eq!(report.volumes_created, 1);
            assert_eq!(report.parts.len(), 1);
            assert_eq!(report.parts[0].length, 10_000);
            assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_too_many_parts_is_skipped() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let huge = src.path().join("huge.0.t.tar.bz2");
        // Sparse: needs more than u32::MAX one-byte parts
        std::fs::File::create(&huge)
            .unwrap()
            .set_len(u64::from(u32::MAX) + 5)
            .unwrap();
        let small = write_file(src.path(), "small.0.t.tar.bz2", 3);
        let limits = VolumeLimits::new(1, 1, 1).unwrap();
        let mut progress = StatisticsProgress::new();

        let report = Packer::with_cipher(
            PackOptions::new(work.path(), limits).dry_run(true),
            Recorder::default(),
        )
        .pack(&[&huge, &small], &mut progress)
        .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("parts"));
        assert_eq!(report.parts.len(), 3);
        assert_eq!(progress.total_parts, 3);
    }

    #[test]
    fn test_plan_totals_match_run() {
        let limits = VolumeLimits::new(10_000, 3_000, 100).unwrap();
        let inputs = [
            InputFile {
                path: PathBuf::from("a"),
                size: 7_000,
            },
            InputFile {
                path: PathBuf::from("b"),
                size: 0,
            },
            InputFile {
                path: PathBuf::from("c"),
                size: 6_500,
            },
        ];
        // a: 3000, 3000, 1000; c: 3000 (vol 1 has 3000 left), 3000, 500
        assert_eq!(plan_totals(&inputs, &limits), (6, 13_500));
    }
}
