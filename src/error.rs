//! Error types for the patch pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::format::HeaderType;

/// Result type alias for patch operations
pub type Result<T> = std::result::Result<T, PatchError>;

/// Coarse grouping of [`PatchError`] variants, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file is not something we know how to unwrap.
    Format,
    /// A pattern did not match the way it was declared.
    Validation,
    /// Underlying I/O or resource limits.
    Resource,
}

/// Everything that can abort a single file's patch run.
#[derive(Error, Debug)]
pub enum PatchError {
    /// Magic bytes matched none of cpio, xz or gzip
    #[error("unsupported format {}", hex::encode(.magic))]
    UnsupportedFormat {
        /// The raw prefix that was read
        magic: Vec<u8>,
    },

    /// The payload behind a cpio header is not compressed
    #[error("unsupported payload after cpio header: {found}")]
    UnexpectedPayload {
        /// Type sniffed after the cut
        found: HeaderType,
    },

    /// The cpio stream ended before a `TRAILER!!!` record
    #[error("cpio trailer not found")]
    TrailerNotFound,

    /// Only zero bytes followed the cpio trailer
    #[error("EOF while scanning padding")]
    PaddingEof,

    /// A search pattern matched nowhere
    #[error("pattern {index} not found")]
    PatternNotFound {
        /// Position of the pattern in the list
        index: usize,
    },

    /// A search pattern matched, but not the declared number of times
    #[error("pattern {index} invalid offset count: found {found} != expected {expected}")]
    InvalidOffsetCount {
        /// Position of the pattern in the list
        index: usize,
        /// Declared count
        expected: usize,
        /// Number of offsets actually found
        found: usize,
    },

    /// A pattern that can never be applied in place
    #[error("pattern {index} is invalid: {reason}")]
    InvalidPattern {
        /// Position of the pattern in the list
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Another target in the same batch already owns this base name
    #[error("side file name {name:?} already used by {other}")]
    DuplicateName {
        /// Base name shared by both targets
        name: String,
        /// The target that claimed the name first
        other: PathBuf,
    },

    /// The `.bak` copy does not hash to the same digest as the original
    #[error("backup verification failed for {}", .path.display())]
    BackupMismatch {
        /// Backup file that was written
        path: PathBuf,
    },

    /// Decompressed gzip payload exceeded the configured cap
    #[error("decompression limit reached ({limit} bytes)")]
    DecompressLimit {
        /// The cap that was hit
        limit: u64,
    },

    /// I/O failure with a short description of the step
    #[error("{context}: {source}")]
    Io {
        /// Which step failed
        context: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    /// Classify the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::UnsupportedFormat { .. }
            | PatchError::UnexpectedPayload { .. }
            | PatchError::TrailerNotFound
            | PatchError::PaddingEof => ErrorKind::Format,
            PatchError::PatternNotFound { .. }
            | PatchError::InvalidOffsetCount { .. }
            | PatchError::InvalidPattern { .. }
            | PatchError::DuplicateName { .. } => ErrorKind::Validation,
            PatchError::BackupMismatch { .. }
            | PatchError::DecompressLimit { .. }
            | PatchError::Io { .. } => ErrorKind::Resource,
        }
    }
}

/// Attach a step description to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn ctx(self, context: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn ctx(self, context: &'static str) -> Result<T> {
        self.map_err(|source| PatchError::Io { context, source })
    }
}
