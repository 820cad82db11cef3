//! Error and Result types for MEF 3 operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for MEF operations.
pub type Result<T> = std::result::Result<T, MefError>;

/// The error type for MEF operations.
///
/// Only structural problems are errors. Corrupt blocks and windows that run
/// past recorded coverage are reported as [`ReadWarning`](crate::ReadWarning)s
/// next to the decoded samples.
#[derive(Debug, Error)]
pub enum MefError {
    /// A path does not follow the session/channel/segment naming convention.
    #[error("Path error: {0}")]
    Path(String),

    /// Invalid password combination, e.g. a level-2 password without level 1.
    #[error("Password error: {0}")]
    Password(String),

    /// An expected companion file is absent.
    #[error("File missing: {}", path.display())]
    FileMissing {
        /// The missing file.
        path: PathBuf,
    },

    /// A file that must not be overwritten already exists.
    #[error("File already exists: {}", path.display())]
    FileExists {
        /// The existing file.
        path: PathBuf,
    },

    /// Requested lower bound is not below the upper bound.
    #[error("Range error: lower bound {lower} must be smaller than upper bound {upper}")]
    Range {
        /// Requested lower bound.
        lower: i64,
        /// Requested upper bound.
        upper: i64,
    },

    /// Universal header type string is not the one expected.
    #[error("Invalid file type: expected {expected}, got {actual:?}")]
    InvalidFileType {
        /// Expected type code.
        expected: &'static str,
        /// Type code found in the header.
        actual: [u8; 4],
    },

    /// Unsupported MEF format version.
    #[error("Unsupported version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version.
        major: u8,
        /// Minor version.
        minor: u8,
    },

    /// Checksum does not match the stored value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Stored CRC32 checksum.
        expected: u32,
        /// Computed CRC32 checksum.
        actual: u32,
    },

    /// Writes require at least one sample.
    #[error("No samples to write")]
    EmptyInput,

    /// Block size must be positive.
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// The supplied password does not unlock a section that is required.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Block could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Record could not be encoded or decoded.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Metadata values are inconsistent or unusable.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
