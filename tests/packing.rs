//! Packing integration tests.
//!
//! These tests verify:
//! - Part layout across volumes, file ceilings and dry runs
//! - The default gpg backend writes parts gpg can decrypt
//! - Encrypted parts decrypt to exactly their source ranges
//! - Dry runs touch nothing
//! - Per-part failures, skips and cancellation are recorded, not fatal
//! - A volume directory that cannot be created aborts the run, keeping
//!   the parts already placed and reporting them

mod common;

use std::fs;

use tempfile::TempDir;

use common::{
    PASSPHRASE, RecordingCipher, decrypt, fast_cipher, gpg_available, gpg_cipher, gpg_decrypt,
    passphrase_file, random_file, small_limits, tree,
};
use offsite::crypto::{PART_MAGIC, Passphrase, encrypted_len};
use offsite::{
    AtomicProgress, Error, NoProgress, PackOptions, Packer, PassphraseSource, StatisticsProgress,
    VolumeLimits,
};

fn options(work: &TempDir, limits: VolumeLimits) -> PackOptions {
    PackOptions::new(work.path(), limits).passphrase(Passphrase::new(PASSPHRASE))
}

#[test]
fn test_file_spans_three_volumes() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, data) = random_file(src.path(), "home.0.20240101.tar.bz2", 25_000, 1);

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&path], &mut NoProgress)
        .unwrap();

    assert!(report.is_ok());
    assert_eq!(report.volumes_created, 3);
    assert_eq!(
        tree(work.path()),
        vec![
            "1",
            "1/home.0.20240101.tar.bz2.01of03.ofsp",
            "2",
            "2/home.0.20240101.tar.bz2.02of03.ofsp",
            "3",
            "3/home.0.20240101.tar.bz2.03of03.ofsp",
        ]
    );

    let lengths: Vec<u64> = report.parts.iter().map(|p| p.length).collect();
    assert_eq!(lengths, vec![10_000, 10_000, 5_000]);

    let mut restored = Vec::new();
    for part in &report.parts {
        let bytes = fs::read(&part.destination).unwrap();
        assert_eq!(&bytes[..4], &PART_MAGIC);
        assert_eq!(bytes.len() as u64, encrypted_len(part.length));
        restored.extend(decrypt(&bytes, PASSPHRASE));
    }
    assert_eq!(restored, data);
}

#[test]
fn test_second_file_spills_to_next_volume() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (a, a_data) = random_file(src.path(), "a.0.20240101.tar.bz2", 6_000, 2);
    let (b, b_data) = random_file(src.path(), "b.0.20240101.tar.bz2", 6_000, 3);

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&a, &b], &mut NoProgress)
        .unwrap();

    assert_eq!(report.volumes_created, 2);
    assert_eq!(
        tree(work.path()),
        vec![
            "1",
            "1/a.0.20240101.tar.bz2.ofsp",
            "1/b.0.20240101.tar.bz2.01of02.ofsp",
            "2",
            "2/b.0.20240101.tar.bz2.02of02.ofsp",
        ]
    );

    let read = |rel: &str| decrypt(&fs::read(work.path().join(rel)).unwrap(), PASSPHRASE);
    assert_eq!(read("1/a.0.20240101.tar.bz2.ofsp"), a_data);
    assert_eq!(read("1/b.0.20240101.tar.bz2.01of02.ofsp"), &b_data[..4_000]);
    assert_eq!(read("2/b.0.20240101.tar.bz2.02of02.ofsp"), &b_data[4_000..]);
}

#[test]
fn test_file_ceiling_caps_part_length() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, _) = random_file(src.path(), "srv.0.20240101.tar.bz2", 7_000, 4);
    let limits = VolumeLimits::new(10_000, 3_000, 100).unwrap();
    let cipher = RecordingCipher::default();

    let report = Packer::with_cipher(options(&work, limits), &cipher)
        .pack(&[&path], &mut NoProgress)
        .unwrap();

    assert_eq!(report.volumes_created, 1);
    let layout: Vec<(u64, u64, bool)> = report
        .parts
        .iter()
        .map(|p| (p.offset, p.length, p.to_eof))
        .collect();
    assert_eq!(
        layout,
        vec![(0, 3_000, false), (3_000, 3_000, false), (6_000, 1_000, true)]
    );

    let requests = cipher.requests.lock().unwrap();
    let blocks: Vec<(u64, u64)> = requests
        .iter()
        .map(|r| (r.offset_blocks, r.copy_blocks))
        .collect();
    assert_eq!(blocks, vec![(0, 30), (30, 30), (60, 0)]);
}

#[test]
fn test_dry_run_touches_nothing() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let out = work.path().join("offsite");
    let (a, _) = random_file(src.path(), "a.0.20240101.tar.bz2", 6_000, 5);
    let (b, _) = random_file(src.path(), "b.0.20240101.tar.bz2", 6_000, 6);
    let cipher = RecordingCipher::default();

    // No passphrase source at all
    let options = PackOptions::new(&out, small_limits()).dry_run(true);
    let report = Packer::with_cipher(options, &cipher)
        .pack(&[&a, &b], &mut NoProgress)
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.volumes_created, 2);
    assert_eq!(
        report.parts.last().unwrap().destination,
        out.join("2").join("b.0.20240101.tar.bz2.02of02.gpg")
    );
    assert_eq!(cipher.count(), 0);
    assert!(!out.exists());
}

#[test]
fn test_parallel_matches_sequential() {
    let src = TempDir::new().unwrap();
    let seq = TempDir::new().unwrap();
    let par = TempDir::new().unwrap();
    let files: Vec<_> = (0..4)
        .map(|i| random_file(src.path(), &format!("fs{}.0.20240101.tar.bz2", i), 7_300, 10 + i))
        .collect();
    let paths: Vec<_> = files.iter().map(|(p, _)| p.clone()).collect();

    let sequential = Packer::with_cipher(options(&seq, small_limits()), fast_cipher())
        .pack(&paths, &mut NoProgress)
        .unwrap();
    let parallel = Packer::with_cipher(options(&par, small_limits()).threads(4), fast_cipher())
        .pack(&paths, &mut NoProgress)
        .unwrap();

    assert!(parallel.is_ok());
    assert_eq!(tree(seq.path()), tree(par.path()));
    assert_eq!(sequential.parts.len(), parallel.parts.len());
    for (s, p) in sequential.parts.iter().zip(&parallel.parts) {
        assert_eq!((s.volume, s.offset, s.length), (p.volume, p.offset, p.length));
    }

    for (path, data) in &files {
        let name = path.file_name().unwrap();
        let restored: Vec<u8> = parallel
            .parts
            .iter()
            .filter(|p| p.source.file_name() == Some(name))
            .flat_map(|p| decrypt(&fs::read(&p.destination).unwrap(), PASSPHRASE))
            .collect();
        assert_eq!(&restored, data);
    }
}

#[test]
fn test_passphrase_read_from_file() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, data) = random_file(src.path(), "etc.0.20240101.tar.bz2", 1_234, 7);

    let options = PackOptions::new(work.path(), small_limits())
        .passphrase(PassphraseSource::file(passphrase_file(src.path())));
    let report = Packer::with_cipher(options, fast_cipher())
        .pack(&[&path], &mut NoProgress)
        .unwrap();

    let part = fs::read(&report.parts[0].destination).unwrap();
    assert_eq!(decrypt(&part, PASSPHRASE), data);
}

#[test]
fn test_unavailable_passphrase_fails_each_part() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, _) = random_file(src.path(), "big.0.20240101.tar.bz2", 25_000, 8);

    let options = PackOptions::new(work.path(), small_limits())
        .passphrase(PassphraseSource::env("OFFSITE_TEST_PASSPHRASE_THAT_IS_NEVER_SET"));
    let report = Packer::with_cipher(options, fast_cipher())
        .pack(&[&path], &mut NoProgress)
        .unwrap();

    assert!(report.parts.is_empty());
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures[0].error.contains("passphrase"));
    // Volumes are still opened for every placed part
    assert_eq!(report.volumes_created, 3);
}

#[test]
fn test_existing_destination_not_overwritten() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (a, _) = random_file(src.path(), "a.0.20240101.tar.bz2", 500, 9);
    let (b, b_data) = random_file(src.path(), "b.0.20240101.tar.bz2", 500, 10);
    fs::create_dir(work.path().join("1")).unwrap();
    fs::write(work.path().join("1/a.0.20240101.tar.bz2.ofsp"), b"keep me").unwrap();

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&a, &b], &mut NoProgress)
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("already exists"));
    assert_eq!(
        fs::read(work.path().join("1/a.0.20240101.tar.bz2.ofsp")).unwrap(),
        b"keep me"
    );
    let part = fs::read(work.path().join("1/b.0.20240101.tar.bz2.ofsp")).unwrap();
    assert_eq!(decrypt(&part, PASSPHRASE), b_data);
}

fn assert_volume_failure_keeps_first_part(threads: usize) {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, data) = random_file(src.path(), "big.0.20240101.tar.bz2", 15_000, 11);
    // A regular file where volume 2 should go
    fs::write(work.path().join("2"), b"").unwrap();

    let err = Packer::with_cipher(options(&work, small_limits()).threads(threads), fast_cipher())
        .pack(&[&path], &mut NoProgress)
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, Error::VolumeCreate { volume: 2, .. }));

    // The part placed before the failure is written and reported
    let first = work.path().join("1/big.0.20240101.tar.bz2.01of02.ofsp");
    assert_eq!(decrypt(&fs::read(&first).unwrap(), PASSPHRASE), &data[..10_000]);
    let report = err.partial_report().unwrap();
    assert_eq!(report.volumes_created, 1);
    assert_eq!(report.parts.len(), 1);
    assert_eq!(report.parts[0].destination, first);
    assert!(report.failures.is_empty());
}

#[test]
fn test_volume_directory_failure_is_fatal() {
    assert_volume_failure_keeps_first_part(1);
}

#[test]
fn test_volume_directory_failure_is_fatal_in_parallel() {
    assert_volume_failure_keeps_first_part(4);
}

#[test]
fn test_skipped_and_empty_files() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (empty, _) = random_file(src.path(), "empty.0.20240101.tar.bz2", 0, 12);
    let (ok, _) = random_file(src.path(), "ok.0.20240101.tar.bz2", 300, 13);
    let missing = src.path().join("missing.0.20240101.tar.bz2");
    let mut progress = StatisticsProgress::new();

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&missing, &empty, &ok, &src.path().to_path_buf()], &mut progress)
        .unwrap();

    assert_eq!(report.parts.len(), 1);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].path, missing);
    assert!(report.skipped[1].reason.contains("not a regular file"));
    assert_eq!(progress.parts_done, 1);
    // Two skips plus the empty file
    assert_eq!(progress.warnings.len(), 3);
    assert!(!report.is_ok());
}

#[test]
fn test_cancelled_before_start() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, _) = random_file(src.path(), "big.0.20240101.tar.bz2", 25_000, 14);
    let mut progress = AtomicProgress::shared();
    progress.cancel();

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&path], &mut progress)
        .unwrap();

    assert!(report.cancelled);
    assert!(report.parts.is_empty());
    assert_eq!(report.volumes_created, 0);
    assert!(tree(work.path()).is_empty());
    assert_eq!(progress.total_parts(), 3);
}

#[test]
fn test_cancel_mid_run_keeps_written_parts() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, data) = random_file(src.path(), "big.0.20240101.tar.bz2", 25_000, 15);
    let mut progress = StatisticsProgress::cancel_after(2);

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&path], &mut progress)
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.parts.len(), 2);
    let first = fs::read(&report.parts[0].destination).unwrap();
    assert_eq!(decrypt(&first, PASSPHRASE), &data[..10_000]);
    assert!(!work.path().join("3").exists());
}

#[test]
fn test_existing_volume_directory_reused() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::create_dir(work.path().join("1")).unwrap();
    fs::write(work.path().join("1/README"), b"volume 1").unwrap();
    let (path, _) = random_file(src.path(), "a.0.20240101.tar.bz2", 100, 16);

    let report = Packer::with_cipher(options(&work, small_limits()), fast_cipher())
        .pack(&[&path], &mut NoProgress)
        .unwrap();

    assert!(report.is_ok());
    assert_eq!(
        tree(work.path()),
        vec!["1", "1/README", "1/a.0.20240101.tar.bz2.ofsp"]
    );
}

#[test]
fn test_default_backend_names_parts_gpg() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (path, _) = random_file(src.path(), "home.0.20240101.tar.bz2", 25_000, 17);

    let options = PackOptions::new(work.path(), small_limits()).dry_run(true);
    let report = Packer::new(options).pack(&[&path], &mut NoProgress).unwrap();

    let names: Vec<String> = report
        .parts
        .iter()
        .map(|p| p.destination.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "home.0.20240101.tar.bz2.01of03.gpg",
            "home.0.20240101.tar.bz2.02of03.gpg",
            "home.0.20240101.tar.bz2.03of03.gpg",
        ]
    );
}

#[test]
fn test_gpg_parts_decrypt_with_gpg() {
    if !gpg_available() {
        eprintln!("gpg not found, skipping");
        return;
    }
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    let (path, data) = random_file(src.path(), "home.0.20240101.tar.bz2", 25_000, 18);

    let report = Packer::with_cipher(options(&work, small_limits()), gpg_cipher(home.path()))
        .pack(&[&path], &mut NoProgress)
        .unwrap();

    assert!(report.is_ok(), "{:?}", report.failures);
    assert_eq!(
        tree(work.path()),
        vec![
            "1",
            "1/home.0.20240101.tar.bz2.01of03.gpg",
            "2",
            "2/home.0.20240101.tar.bz2.02of03.gpg",
            "3",
            "3/home.0.20240101.tar.bz2.03of03.gpg",
        ]
    );
    let restored: Vec<u8> = report
        .parts
        .iter()
        .flat_map(|p| gpg_decrypt(home.path(), &p.destination, PASSPHRASE))
        .collect();
    assert_eq!(restored, data);
}
