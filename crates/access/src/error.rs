//! Error types for the access crate.
//!
//! Two families live here. [`PolicyError`] is raised once, when a
//! [`PolicyConfig`](crate::PolicyConfig) is built. [`Rejection`] is the
//! per-request outcome of a failed check and is returned as a value, never
//! panicked or unwound across the resolver boundary.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing a policy.
///
/// All of these map to the `InvalidPolicy` condition: the process cannot
/// serve anything from a root it could not verify.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The root directory does not exist.
    #[error("invalid policy: root directory does not exist: {0}")]
    RootNotFound(PathBuf),

    /// The root path exists but is not a directory.
    #[error("invalid policy: root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    /// The root could not be canonicalized for another reason.
    #[error("invalid policy: cannot resolve root directory {path}: {source}")]
    RootUnresolvable {
        /// The root as supplied (after joining to the working directory).
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The process working directory could not be determined.
    #[error("invalid policy: cannot determine working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    /// A maximum file size of zero admits nothing.
    #[error("invalid policy: max_file_size_bytes must be greater than 0")]
    ZeroMaxFileSize,

    /// An extension entry was empty or contained a path separator.
    #[error("invalid policy: malformed extension entry {0:?}")]
    InvalidExtension(String),
}

/// Classification of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    /// No path was supplied.
    MissingPath,
    /// The path resolves outside the root directory.
    PathEscape,
    /// Nothing exists at the resolved path.
    NotFound,
    /// The target is a directory or special file.
    InvalidFileType,
    /// The target's extension is not on the allow-list.
    ExtensionNotAllowed,
    /// The target exceeds the size limit.
    FileTooLarge,
    /// The process may not query or read the target.
    PermissionDenied,
    /// Any other I/O failure.
    InternalError,
}

impl RejectionKind {
    /// The reason text used when no more specific wording is needed.
    ///
    /// None of these mention the requested or resolved path.
    pub fn default_reason(self) -> &'static str {
        match self {
            Self::MissingPath => "No file path provided",
            Self::PathEscape => "Access denied: File outside of CDN directory",
            Self::NotFound => "File not found",
            Self::InvalidFileType => "Invalid file type",
            Self::ExtensionNotAllowed => "File extension not allowed",
            Self::FileTooLarge => "File exceeds maximum allowed size",
            Self::PermissionDenied => "Permission denied to access file",
            Self::InternalError => "Internal server error during file validation",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingPath => "MissingPath",
            Self::PathEscape => "PathEscape",
            Self::NotFound => "NotFound",
            Self::InvalidFileType => "InvalidFileType",
            Self::ExtensionNotAllowed => "ExtensionNotAllowed",
            Self::FileTooLarge => "FileTooLarge",
            Self::PermissionDenied => "PermissionDenied",
            Self::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A classified refusal to serve a request.
///
/// The reason is safe to show to the caller: it never carries an absolute
/// path or an OS error code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}")]
pub struct Rejection {
    kind: RejectionKind,
    reason: String,
}

impl Rejection {
    /// Create a rejection with the kind's default reason.
    pub fn new(kind: RejectionKind) -> Self {
        Self {
            kind,
            reason: kind.default_reason().to_string(),
        }
    }

    /// Create a rejection with a custom reason.
    pub(crate) fn with_reason(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while querying a candidate path.
    ///
    /// The error itself is logged by the caller; only the kind survives.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            // A name the filesystem cannot hold (too long, malformed) names
            // no file.
            io::ErrorKind::NotFound
            | io::ErrorKind::NotADirectory
            | io::ErrorKind::InvalidFilename => Self::new(RejectionKind::NotFound),
            io::ErrorKind::PermissionDenied => Self::new(RejectionKind::PermissionDenied),
            _ => Self::new(RejectionKind::InternalError),
        }
    }

    /// The rejection kind.
    pub fn kind(&self) -> RejectionKind {
        self.kind
    }

    /// The caller-facing reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<RejectionKind> for Rejection {
    fn from(kind: RejectionKind) -> Self {
        Self::new(kind)
    }
}
