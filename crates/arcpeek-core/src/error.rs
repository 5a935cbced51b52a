//! Error types for archive reading and extraction.

use std::io;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `ArcError`.
pub type Result<T> = std::result::Result<T, ArcError>;

/// Coarse classification of an [`ArcError`].
///
/// Callers that only need to branch on the category of a failure (for
/// example to decide whether to skip an entry or abort) match on this
/// instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The underlying source or sink failed.
    IoFailure,
    /// A byte limit was hit on a stream or filter.
    LimitExceeded,
    /// The archive or compressed data is structurally invalid.
    MalformedInput,
    /// No known compression or archive signature was found.
    UnrecognizedFormat,
    /// The input is recognized but cannot be handled by this build.
    UnsupportedFeature,
    /// Creating or updating something on disk failed.
    FilesystemFailure,
    /// An entry would have been written outside the destination root.
    UnsafePath,
    /// The API was called in the wrong state.
    Usage,
}

/// Typed faults raised inside stream adapters.
///
/// `Read` implementations can only return [`io::Error`], so the bounded
/// stream and the decompression filters wrap one of these as the error
/// payload. The `From<io::Error>` impl of [`ArcError`] recovers it, which
/// keeps a limit hit deep inside a decoder distinguishable from a plain
/// read failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    /// More bytes were requested than the stream's limit allows.
    #[error("byte limit of {limit} exceeded")]
    LimitExceeded {
        /// The configured limit in bytes.
        limit: u64,
    },

    /// The decoder rejected its input.
    #[error("corrupt {codec} stream: {detail}")]
    Corrupt {
        /// Codec name.
        codec: &'static str,
        /// Decoder message.
        detail: String,
    },
}

impl StreamFault {
    /// Wraps the fault in an [`io::Error`] suitable for returning from `Read`.
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match self {
            Self::LimitExceeded { .. } => io::ErrorKind::Other,
            Self::Corrupt { .. } => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, self)
    }

    /// Returns the fault carried by `err`, if any.
    pub(crate) fn from_io(err: &io::Error) -> Option<&Self> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<Self>())
    }
}

/// Errors produced while reading or extracting archives.
#[derive(Error, Debug)]
pub enum ArcError {
    /// Reading from the underlying source failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A stream or filter produced more bytes than its limit allows.
    #[error("byte limit of {limit} exceeded")]
    LimitExceeded {
        /// The limit that was hit.
        limit: u64,
    },

    /// The archive or compressed payload is structurally invalid.
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// A header checksum did not match its contents.
    #[error("header checksum mismatch: stored {stored:#o}, computed {computed:#o}")]
    ChecksumMismatch {
        /// Checksum recorded in the header.
        stored: u64,
        /// Checksum computed over the header block.
        computed: u64,
    },

    /// No known compression or archive signature was found.
    #[error("unrecognized archive format")]
    UnrecognizedFormat,

    /// The input uses something this build cannot handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A filesystem operation on `path` failed.
    #[error("filesystem operation failed on {}: {source}", path.display())]
    Filesystem {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// An entry path climbs out of the destination or is absolute.
    #[error("path traversal detected: {}", path.display())]
    PathTraversal {
        /// The offending entry path.
        path: PathBuf,
    },

    /// A symlink target resolves outside the destination.
    #[error("symlink {} points outside the destination: {}", path.display(), target.display())]
    SymlinkEscape {
        /// The symlink entry path.
        path: PathBuf,
        /// The rejected target.
        target: PathBuf,
    },

    /// A hardlink target resolves outside the destination.
    #[error("hardlink {} points outside the destination: {}", path.display(), target.display())]
    HardlinkEscape {
        /// The hardlink entry path.
        path: PathBuf,
        /// The rejected target.
        target: PathBuf,
    },

    /// An entry path is rejected for a reason other than traversal.
    #[error("unsafe path {}: {reason}", path.display())]
    UnsafePath {
        /// The offending entry path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// Entry data was requested with no current entry, or after it was
    /// skipped.
    #[error("no current entry data is available")]
    NoCurrentEntry,
}

impl ArcError {
    /// Builds a [`ArcError::Filesystem`] for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Returns the category of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use arcpeek_core::ArcError;
    /// use arcpeek_core::ErrorKind;
    ///
    /// let err = ArcError::LimitExceeded { limit: 1024 };
    /// assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::Malformed(_) | Self::ChecksumMismatch { .. } => ErrorKind::MalformedInput,
            Self::UnrecognizedFormat => ErrorKind::UnrecognizedFormat,
            Self::Unsupported(_) => ErrorKind::UnsupportedFeature,
            Self::Filesystem { .. } => ErrorKind::FilesystemFailure,
            Self::PathTraversal { .. }
            | Self::SymlinkEscape { .. }
            | Self::HardlinkEscape { .. }
            | Self::UnsafePath { .. } => ErrorKind::UnsafePath,
            Self::NoCurrentEntry => ErrorKind::Usage,
        }
    }

    /// Returns `true` if extraction may continue with the next entry.
    ///
    /// Recoverable errors concern a single entry (a rejected path, a
    /// failed write, an entry type this platform cannot create). Anything
    /// that leaves the archive stream in an unknown state is fatal.
    ///
    /// # Examples
    ///
    /// ```
    /// use arcpeek_core::ArcError;
    /// use std::path::PathBuf;
    ///
    /// let err = ArcError::PathTraversal {
    ///     path: PathBuf::from("../etc/passwd"),
    /// };
    /// assert!(err.is_recoverable());
    ///
    /// let err = ArcError::Malformed("truncated header".to_string());
    /// assert!(!err.is_recoverable());
    /// ```
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FilesystemFailure | ErrorKind::UnsafePath | ErrorKind::UnsupportedFeature
        )
    }

    /// Returns `true` if the reader cannot make further progress.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the entry or filesystem path involved, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Filesystem { path, .. }
            | Self::PathTraversal { path }
            | Self::SymlinkEscape { path, .. }
            | Self::HardlinkEscape { path, .. }
            | Self::UnsafePath { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<io::Error> for ArcError {
    fn from(err: io::Error) -> Self {
        match StreamFault::from_io(&err).cloned() {
            Some(StreamFault::LimitExceeded { limit }) => Self::LimitExceeded { limit },
            Some(fault @ StreamFault::Corrupt { .. }) => Self::Malformed(fault.to_string()),
            None if err.kind() == io::ErrorKind::UnexpectedEof => {
                Self::Malformed(format!("unexpected end of data: {err}"))
            }
            None => Self::Io(err),
        }
    }
}
