//! File access checks.
//!
//! [`check`] runs the full verdict for one request: containment via
//! [`resolver::resolve`](crate::resolver::resolve), then existence, file
//! type, extension and size, stopping at the first failure.
//!
//! The checks and a later read are not atomic. A file may be swapped or
//! removed between a successful [`check`] and the caller opening it; readers
//! must treat open/read failures as internal errors.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Rejection, RejectionKind};
use crate::policy::PolicyConfig;
use crate::resolver::{self, ContainedPath};

/// A verified path to a regular file inside the policy root.
///
/// Only [`check`] can produce one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    path: PathBuf,
    size: u64,
}

impl SafePath {
    /// The canonical absolute path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Consume and return the canonical absolute path.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }

    /// File size in bytes at the time of the check.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl AsRef<Path> for SafePath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SafePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Outcome of a check.
pub type Verdict = Result<SafePath, Rejection>;

/// Decide whether `requested` may be served under `policy`.
pub fn check(requested: &str, policy: &PolicyConfig) -> Verdict {
    let verdict = resolver::resolve(requested, policy).and_then(|c| inspect(c, policy));
    match &verdict {
        Ok(safe) => tracing::debug!(requested, path = %safe, "access granted"),
        Err(rejection) => tracing::debug!(
            requested,
            kind = %rejection.kind(),
            "access rejected"
        ),
    }
    verdict
}

/// Apply the filesystem and policy checks to a contained candidate.
fn inspect(candidate: ContainedPath, policy: &PolicyConfig) -> Verdict {
    if candidate.is_root() {
        return Err(Rejection::new(RejectionKind::InvalidFileType));
    }

    let metadata = fs::metadata(candidate.as_path()).map_err(|e| {
        let rejection = Rejection::from_io(&e);
        if rejection.kind() != RejectionKind::NotFound {
            tracing::warn!(
                path = %candidate.as_path().display(),
                error = %e,
                "failed to stat candidate"
            );
        }
        rejection
    })?;

    if !metadata.is_file() {
        return Err(Rejection::new(RejectionKind::InvalidFileType));
    }

    if policy.allowed_extensions().is_some() {
        let extension = extension_of(candidate.as_path());
        if !policy.allows_extension(&extension) {
            return Err(Rejection::new(RejectionKind::ExtensionNotAllowed));
        }
    }

    let size = metadata.len();
    if let Some(limit) = policy.max_file_size_bytes() {
        if size > limit {
            return Err(Rejection::with_reason(
                RejectionKind::FileTooLarge,
                format!("File exceeds maximum allowed size of {limit} bytes"),
            ));
        }
    }

    Ok(SafePath {
        path: candidate.into_path_buf(),
        size,
    })
}

/// Lowercase extension of the final path segment, including the dot.
///
/// Everything from the last `.` of the file name is the extension, so
/// `archive.tar.GZ` gives `.gz`, `.env` gives `.env`, and `README` gives an
/// empty string.
pub fn extension_of(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    name.rfind('.')
        .map(|idx| name[idx..].to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyOverrides;
    use tempfile::TempDir;

    fn root_with_files() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("test.txt"), "Test content!").unwrap();
        fs::write(root.join("image.jpg"), "Fake image data").unwrap();
        fs::write(root.join("UPPER.TXT"), "shouting").unwrap();
        fs::write(root.join("noext"), "bare").unwrap();
        fs::create_dir(root.join("folder")).unwrap();
        temp_dir
    }

    fn policy_for(root: &Path, overrides: PolicyOverrides) -> PolicyConfig {
        PolicyConfig::from_overrides(overrides.root_directory(root)).unwrap()
    }

    fn kind_of(verdict: Verdict) -> RejectionKind {
        verdict.unwrap_err().kind()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/cdn/test.txt")), ".txt");
        assert_eq!(extension_of(Path::new("/cdn/PHOTO.JPG")), ".jpg");
        assert_eq!(extension_of(Path::new("/cdn/archive.tar.gz")), ".gz");
        assert_eq!(extension_of(Path::new("/cdn/README")), "");
        assert_eq!(extension_of(Path::new("/cdn/.env")), ".env");
        assert_eq!(extension_of(Path::new("/cdn/trailing.")), ".");
        assert_eq!(extension_of(Path::new("/cdn.d/file")), "");
    }

    #[test]
    fn test_grants_regular_file() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());

        let safe = check("test.txt", &policy).unwrap();
        assert_eq!(safe.as_path(), policy.root_directory().join("test.txt"));
        assert_eq!(safe.size(), 13);
    }

    #[test]
    fn test_missing_path() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(kind_of(check("", &policy)), RejectionKind::MissingPath);
    }

    #[test]
    fn test_root_itself_is_invalid_file_type() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default().any_extension());
        assert_eq!(kind_of(check(".", &policy)), RejectionKind::InvalidFileType);
        assert_eq!(kind_of(check("./", &policy)), RejectionKind::InvalidFileType);
    }

    #[test]
    fn test_directory_is_invalid_file_type() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default().any_extension());
        assert_eq!(
            kind_of(check("folder", &policy)),
            RejectionKind::InvalidFileType
        );
        assert_eq!(
            kind_of(check("folder/", &policy)),
            RejectionKind::InvalidFileType
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("missing.txt", &policy)),
            RejectionKind::NotFound
        );
        assert_eq!(
            kind_of(check("folder/deeper/missing.txt", &policy)),
            RejectionKind::NotFound
        );
    }

    #[test]
    fn test_overlong_name_is_not_found() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        let request = format!("{}.txt", "a".repeat(300));
        assert_eq!(kind_of(check(&request, &policy)), RejectionKind::NotFound);
    }

    #[test]
    fn test_file_used_as_directory_is_not_found() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("test.txt/child.txt", &policy)),
            RejectionKind::NotFound
        );
    }

    #[test]
    fn test_extension_not_allowed() {
        let tmp = root_with_files();
        let policy = policy_for(
            tmp.path(),
            PolicyOverrides::default().allowed_extensions([".txt"]),
        );
        assert_eq!(
            kind_of(check("image.jpg", &policy)),
            RejectionKind::ExtensionNotAllowed
        );
        assert!(check("test.txt", &policy).is_ok());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let tmp = root_with_files();
        let policy = policy_for(
            tmp.path(),
            PolicyOverrides::default().allowed_extensions([".txt"]),
        );
        assert!(check("UPPER.TXT", &policy).is_ok());
    }

    #[test]
    fn test_no_extension_rejected_under_allow_list() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("noext", &policy)),
            RejectionKind::ExtensionNotAllowed
        );

        let open = policy_for(tmp.path(), PolicyOverrides::default().any_extension());
        assert!(check("noext", &open).is_ok());
    }

    #[test]
    fn test_file_too_large() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default().max_file_size_bytes(12));

        let rejection = check("test.txt", &policy).unwrap_err();
        assert_eq!(rejection.kind(), RejectionKind::FileTooLarge);
        assert!(!rejection.reason().contains("test.txt"));
    }

    #[test]
    fn test_size_at_limit_is_allowed() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default().max_file_size_bytes(13));
        assert!(check("test.txt", &policy).is_ok());
    }

    #[test]
    fn test_type_checked_before_extension() {
        let tmp = root_with_files();
        fs::create_dir(tmp.path().join("dir.txt")).unwrap();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("dir.txt", &policy)),
            RejectionKind::InvalidFileType
        );
    }

    #[test]
    fn test_extension_checked_before_size() {
        let tmp = root_with_files();
        let policy = policy_for(
            tmp.path(),
            PolicyOverrides::default()
                .allowed_extensions([".txt"])
                .max_file_size_bytes(1),
        );
        assert_eq!(
            kind_of(check("image.jpg", &policy)),
            RejectionKind::ExtensionNotAllowed
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_to_directory_is_invalid_file_type() {
        let tmp = root_with_files();
        std::os::unix::fs::symlink(tmp.path().join("folder"), tmp.path().join("dirlink.txt"))
            .unwrap();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("dirlink.txt", &policy)),
            RejectionKind::InvalidFileType
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_extension_taken_from_symlink_target() {
        let tmp = root_with_files();
        std::os::unix::fs::symlink(tmp.path().join("noext"), tmp.path().join("disguised.txt"))
            .unwrap();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("disguised.txt", &policy)),
            RejectionKind::ExtensionNotAllowed
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_dangling_symlink_is_not_found() {
        let tmp = root_with_files();
        std::os::unix::fs::symlink(tmp.path().join("gone.txt"), tmp.path().join("dangling.txt"))
            .unwrap();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        assert_eq!(
            kind_of(check("dangling.txt", &policy)),
            RejectionKind::NotFound
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_socket_is_invalid_file_type() {
        let tmp = root_with_files();
        let _listener =
            std::os::unix::net::UnixListener::bind(tmp.path().join("control.sock")).unwrap();
        let policy = policy_for(tmp.path(), PolicyOverrides::default().any_extension());
        assert_eq!(
            kind_of(check("control.sock", &policy)),
            RejectionKind::InvalidFileType
        );
    }

    #[test]
    fn test_check_is_idempotent() {
        let tmp = root_with_files();
        let policy = policy_for(tmp.path(), PolicyOverrides::default());
        for request in ["test.txt", "missing.txt", "../escape.txt", "folder", ""] {
            assert_eq!(check(request, &policy), check(request, &policy));
        }
    }
}
