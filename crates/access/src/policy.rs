//! Access policy for a served directory.
//!
//! A [`PolicyConfig`] is built once per served root and then shared
//! read-only by every check. Construction is the only place the root is
//! canonicalized, so later containment checks compare against a fixed,
//! symlink-free path.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PolicyError;

/// Directory name used for the root when none is configured.
pub const DEFAULT_ROOT_DIR_NAME: &str = "cdn_files";

/// Extensions served when no allow-list is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    ".txt", ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".mp4", ".mp3", ".csv", ".json", ".xml",
];

/// Maximum file size when none is configured (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Partial policy settings layered over the defaults.
///
/// Each field is applied independently. `None` keeps the default; for the
/// two optional limits, `Some(None)` lifts the restriction entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    /// Root directory, absolute or relative to the working directory.
    pub root_directory: Option<PathBuf>,
    /// Extension allow-list.
    pub allowed_extensions: Option<Option<Vec<String>>>,
    /// Size limit in bytes.
    pub max_file_size_bytes: Option<Option<u64>>,
}

impl PolicyOverrides {
    /// Set the root directory.
    pub fn root_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_directory = Some(root.into());
        self
    }

    /// Restrict serving to the given extensions.
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = Some(Some(extensions.into_iter().map(Into::into).collect()));
        self
    }

    /// Serve files of any extension.
    pub fn any_extension(mut self) -> Self {
        self.allowed_extensions = Some(None);
        self
    }

    /// Limit served files to `bytes`.
    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = Some(Some(bytes));
        self
    }

    /// Serve files of any size.
    pub fn unlimited_size(mut self) -> Self {
        self.max_file_size_bytes = Some(None);
        self
    }
}

/// Immutable policy describing what may be served and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    root_directory: PathBuf,
    allowed_extensions: Option<BTreeSet<String>>,
    max_file_size_bytes: Option<u64>,
}

impl PolicyConfig {
    /// Build a policy for `root` with default extension and size limits.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        Self::from_overrides(PolicyOverrides::default().root_directory(root))
    }

    /// Build a policy from overrides, resolving a relative root against the
    /// process working directory.
    pub fn from_overrides(overrides: PolicyOverrides) -> Result<Self, PolicyError> {
        let cwd = std::env::current_dir().map_err(PolicyError::WorkingDirectory)?;
        Self::from_overrides_in(&cwd, overrides)
    }

    /// Build a policy from overrides, resolving a relative root against
    /// `base` instead of the process working directory.
    pub fn from_overrides_in(base: &Path, overrides: PolicyOverrides) -> Result<Self, PolicyError> {
        let root = match overrides.root_directory {
            Some(root) if root.is_absolute() => root,
            Some(root) => base.join(root),
            None => base.join(DEFAULT_ROOT_DIR_NAME),
        };
        let root_directory = canonical_root(&root)?;

        let allowed_extensions = match overrides.allowed_extensions {
            None => Some(
                DEFAULT_ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| (*ext).to_string())
                    .collect(),
            ),
            Some(None) => None,
            Some(Some(list)) => Some(
                list.iter()
                    .map(|ext| normalize_extension(ext))
                    .collect::<Result<BTreeSet<_>, _>>()?,
            ),
        };

        let max_file_size_bytes = match overrides.max_file_size_bytes {
            None => Some(DEFAULT_MAX_FILE_SIZE),
            Some(Some(0)) => return Err(PolicyError::ZeroMaxFileSize),
            Some(limit) => limit,
        };

        tracing::debug!(
            root = %root_directory.display(),
            extensions = ?allowed_extensions,
            max_file_size_bytes = ?max_file_size_bytes,
            "built access policy"
        );

        Ok(Self {
            root_directory,
            allowed_extensions,
            max_file_size_bytes,
        })
    }

    /// The canonical root directory.
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// The extension allow-list, or `None` when unrestricted.
    pub fn allowed_extensions(&self) -> Option<&BTreeSet<String>> {
        self.allowed_extensions.as_ref()
    }

    /// The size limit in bytes, or `None` when unrestricted.
    pub fn max_file_size_bytes(&self) -> Option<u64> {
        self.max_file_size_bytes
    }

    /// Whether `extension` (lowercase, with leading dot) may be served.
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .as_ref()
            .map(|set| set.contains(extension))
            .unwrap_or(true)
    }

    /// Whether a file of `size` bytes may be served.
    pub fn allows_size(&self, size: u64) -> bool {
        self.max_file_size_bytes
            .map(|limit| size <= limit)
            .unwrap_or(true)
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, PolicyError> {
    let canonical = fs::canonicalize(root).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PolicyError::RootNotFound(root.to_path_buf()),
        io::ErrorKind::NotADirectory => PolicyError::RootNotDirectory(root.to_path_buf()),
        _ => PolicyError::RootUnresolvable {
            path: root.to_path_buf(),
            source: e,
        },
    })?;

    if !canonical.is_dir() {
        return Err(PolicyError::RootNotDirectory(root.to_path_buf()));
    }

    Ok(canonical)
}

/// Lowercase an extension entry and give it a leading dot.
fn normalize_extension(raw: &str) -> Result<String, PolicyError> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if bare.is_empty() || bare.contains(['/', '\\']) {
        return Err(PolicyError::InvalidExtension(raw.to_string()));
    }
    Ok(format!(".{}", bare.to_lowercase()))
}
