//! Exit codes for the CLI tool.

use jarcloak::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Archive or class file format error
pub const BAD_ARCHIVE: i32 = 3;
/// I/O error, including a failing encode hook
pub const IO_ERROR: i32 = 5;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    FatalError,
    BadArchive,
    IoError,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::FatalError => FATAL_ERROR,
            Self::BadArchive => BAD_ARCHIVE,
            Self::IoError => IO_ERROR,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts a jarcloak error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(_) => ExitCode::IoError,
        Error::EncodeFailed { .. } => ExitCode::IoError,
        Error::InvalidFormat(_) | Error::CorruptEntry { .. } => ExitCode::BadArchive,
        Error::CrcMismatch { .. } => ExitCode::BadArchive,
        Error::UnsupportedMethod { .. } => ExitCode::BadArchive,
        Error::UnsupportedFeature { .. } => ExitCode::BadArchive,
        Error::DuplicateEntry { .. } => ExitCode::BadArchive,
        Error::InvalidClassFile { .. } => ExitCode::BadArchive,
        Error::MissingManifestAttribute { .. } => ExitCode::BadArchive,
        Error::InvalidEntryPath(_) => ExitCode::BadArgs,
        Error::OutputOverwritesInput { .. } => ExitCode::BadArgs,
        Error::MissingDecodeHelper { .. } => ExitCode::BadArgs,
        Error::PatchFailed { .. } => ExitCode::FatalError,
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}
