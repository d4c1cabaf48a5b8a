//! Exit codes for the CLI tool.

use offsite::{Error, PackReport};

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Completed, but some parts failed or some files were skipped
pub const WARNING: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// I/O error, including a volume directory that could not be created
pub const IO_ERROR: i32 = 5;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Warning,
    FatalError,
    IoError,
    UserInterrupt,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Warning => WARNING,
            Self::FatalError => FATAL_ERROR,
            Self::IoError => IO_ERROR,
            Self::UserInterrupt => USER_INTERRUPT,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts an offsite error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(_) | Error::VolumeCreate { .. } => ExitCode::IoError,
        Error::SizeProbe { .. } | Error::DestinationExists { .. } => ExitCode::IoError,
        Error::InvalidLimits(_) | Error::InvalidArchiveName(_) => ExitCode::BadArgs,
        Error::Passphrase(_) => ExitCode::FatalError,
        Error::Extraction { .. } | Error::CryptoError(_) => ExitCode::FatalError,
        Error::ResourceLimitExceeded(_) => ExitCode::FatalError,
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}

/// Derives the exit code of a finished run from its report
pub fn report_to_exit_code(report: &PackReport) -> ExitCode {
    if report.cancelled {
        ExitCode::UserInterrupt
    } else if !report.failures.is_empty() || !report.skipped.is_empty() {
        ExitCode::Warning
    } else {
        ExitCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsite::SkippedFile;
    use std::path::PathBuf;

    #[test]
    fn test_volume_create_is_io_error() {
        let err = Error::VolumeCreate {
            volume: 2,
            path: PathBuf::from("/w/2"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            report: None,
        };
        assert_eq!(error_to_exit_code(&err).code(), IO_ERROR);
        assert_eq!(
            error_to_exit_code(&Error::InvalidLimits("x".into())).code(),
            BAD_ARGS
        );
    }

    #[test]
    fn test_report_exit_codes() {
        assert_eq!(report_to_exit_code(&PackReport::default()), ExitCode::Success);

        let mut report = PackReport::default();
        report.skipped.push(SkippedFile {
            path: PathBuf::from("/gone"),
            reason: "not found".into(),
        });
        assert_eq!(report_to_exit_code(&report), ExitCode::Warning);

        report.cancelled = true;
        assert_eq!(report_to_exit_code(&report).code(), USER_INTERRUPT);
    }
}
