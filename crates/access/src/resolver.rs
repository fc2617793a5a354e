//! Path containment.
//!
//! [`resolve`] turns a caller-supplied path into a canonical absolute path
//! and proves it lies inside the policy root. It only queries the
//! filesystem to resolve symlinks; it never checks what the target is.
//! That is left to [`guard::check`](crate::guard::check), so the same
//! containment step serves both reads and metadata-only lookups.
//!
//! Lexical normalization runs before and after joining to the root, but it
//! is hygiene only. The byte-level containment check on the canonical path
//! is what actually keeps requests inside the root.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use crate::error::{Rejection, RejectionKind};
use crate::policy::PolicyConfig;

/// A canonical path proven to lie inside the policy root.
///
/// This is only a candidate: the target may not exist, may be a directory,
/// or may violate the extension and size policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainedPath {
    path: PathBuf,
    is_root: bool,
}

impl ContainedPath {
    /// The canonical absolute path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Consume and return the canonical absolute path.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }

    /// Whether the request resolved to the root directory itself.
    pub fn is_root(&self) -> bool {
        self.is_root
    }
}

impl AsRef<Path> for ContainedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Resolve `requested` against the policy root.
///
/// # Errors
///
/// - `MissingPath` when `requested` is empty.
/// - `PathEscape` when the canonical result lies outside the root. The
///   reason never includes the resolved path.
/// - `NotFound`, `PermissionDenied` or `InternalError` when an ancestor of
///   the candidate cannot be resolved.
pub fn resolve(requested: &str, policy: &PolicyConfig) -> Result<ContainedPath, Rejection> {
    if requested.is_empty() {
        return Err(Rejection::new(RejectionKind::MissingPath));
    }
    // No file name can hold a NUL byte.
    if requested.contains('\0') {
        return Err(Rejection::new(RejectionKind::NotFound));
    }

    let root = policy.root_directory();
    let relative = normalize(Path::new(requested));
    let joined = normalize(&root.join(&relative));

    let candidate = canonicalize_lenient(&joined).map_err(|e| {
        let rejection = Rejection::from_io(&e);
        if rejection.kind() == RejectionKind::NotFound {
            tracing::debug!(requested, error = %e, "requested path cannot exist");
        } else {
            tracing::warn!(
                requested,
                error = %e,
                "failed to canonicalize requested path"
            );
        }
        rejection
    })?;

    if !is_within(root, &candidate) {
        tracing::warn!(
            requested,
            resolved = %candidate.display(),
            "rejected path outside root"
        );
        return Err(Rejection::new(RejectionKind::PathEscape));
    }

    let is_root = candidate == root;
    Ok(ContainedPath {
        path: candidate,
        is_root,
    })
}

/// Lexically collapse `.` and `..` components and redundant separators.
///
/// A `..` that cannot be collapsed is kept in a relative path and dropped
/// at the root of an absolute one, so `a/../../b` becomes `../b` and
/// `/../b` becomes `/b`. Trailing separators are not preserved.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir.as_os_str()),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Whether `candidate` equals `root` or lies beneath it.
///
/// The root is compared with a trailing separator appended, so a root of
/// `/cdn` admits `/cdn/a` but not `/cdn-other/a`.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let root = root.as_os_str().as_encoded_bytes();
    let candidate = candidate.as_os_str().as_encoded_bytes();
    if candidate == root {
        return true;
    }

    let separator = MAIN_SEPARATOR as u8;
    let mut prefix = root.to_vec();
    if prefix.last() != Some(&separator) {
        prefix.push(separator);
    }
    candidate.starts_with(&prefix)
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// missing tail.
///
/// `path` must already be lexically normalized, so the tail holds plain
/// names only.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();

    loop {
        match fs::canonicalize(&existing) {
            Ok(mut canonical) => {
                for name in tail.iter().rev() {
                    canonical.push(name);
                }
                return Ok(canonical);
            }
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
            {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Layout: `<tmp>/cdn/{test.txt, docs/readme.txt}` plus a sibling
    /// `<tmp>/cdn-other/secret.txt`.
    fn fixture() -> (TempDir, PolicyConfig) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("cdn");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("test.txt"), "Test content!").unwrap();
        fs::write(root.join("docs/readme.txt"), "readme").unwrap();

        let sibling = temp_dir.path().join("cdn-other");
        fs::create_dir_all(&sibling).unwrap();
        fs::write(sibling.join("secret.txt"), "secret").unwrap();

        let policy = PolicyConfig::new(&root).unwrap();
        (temp_dir, policy)
    }

    fn kind_of(result: Result<ContainedPath, Rejection>) -> RejectionKind {
        result.unwrap_err().kind()
    }

    #[test]
    fn test_normalize_collapses_segments() {
        assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("a//b")), PathBuf::from("a/b"));
        assert_eq!(normalize(Path::new("./a/b/")), PathBuf::from("a/b"));
        assert_eq!(normalize(Path::new(".")), PathBuf::new());
    }

    #[test]
    fn test_normalize_keeps_leading_parent_dirs() {
        assert_eq!(
            normalize(Path::new("../../etc/passwd")),
            PathBuf::from("../../etc/passwd")
        );
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    #[cfg(unix)]
    fn test_normalize_absolute_stops_at_root() {
        assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize(Path::new("/cdn/../../x")), PathBuf::from("/x"));
    }

    #[test]
    #[cfg(unix)]
    fn test_is_within_requires_separator() {
        let root = Path::new("/cdn");
        assert!(is_within(root, Path::new("/cdn")));
        assert!(is_within(root, Path::new("/cdn/test.txt")));
        assert!(is_within(root, Path::new("/cdn/a/b/c")));
        assert!(!is_within(root, Path::new("/cdn-other/secret")));
        assert!(!is_within(root, Path::new("/cdnx")));
        assert!(!is_within(root, Path::new("/")));
        assert!(!is_within(root, Path::new("/etc/passwd")));
    }

    #[test]
    #[cfg(unix)]
    fn test_is_within_filesystem_root() {
        assert!(is_within(Path::new("/"), Path::new("/")));
        assert!(is_within(Path::new("/"), Path::new("/etc")));
    }

    #[test]
    fn test_empty_is_missing_path() {
        let (_tmp, policy) = fixture();
        assert_eq!(kind_of(resolve("", &policy)), RejectionKind::MissingPath);
    }

    #[test]
    fn test_resolves_plain_file() {
        let (_tmp, policy) = fixture();
        let resolved = resolve("test.txt", &policy).unwrap();
        assert_eq!(
            resolved.as_path(),
            policy.root_directory().join("test.txt")
        );
        assert!(!resolved.is_root());
    }

    #[test]
    fn test_resolves_nested_and_dotted() {
        let (_tmp, policy) = fixture();
        let expected = policy.root_directory().join("docs/readme.txt");
        for request in [
            "docs/readme.txt",
            "./docs/readme.txt",
            "docs//readme.txt",
            "docs/../docs/readme.txt",
            "docs/readme.txt/",
        ] {
            assert_eq!(
                resolve(request, &policy).unwrap().as_path(),
                expected,
                "request {request:?}"
            );
        }
    }

    #[test]
    fn test_missing_file_is_still_contained() {
        let (_tmp, policy) = fixture();
        let resolved = resolve("nope/missing.txt", &policy).unwrap();
        assert_eq!(
            resolved.as_path(),
            policy.root_directory().join("nope/missing.txt")
        );
    }

    #[test]
    fn test_dot_resolves_to_root() {
        let (_tmp, policy) = fixture();
        for request in [".", "./", "docs/..", "docs/../."] {
            let resolved = resolve(request, &policy).unwrap();
            assert!(resolved.is_root(), "request {request:?}");
            assert_eq!(resolved.as_path(), policy.root_directory());
        }
    }

    #[test]
    fn test_parent_traversal_escapes() {
        let (_tmp, policy) = fixture();
        for request in [
            "../../etc/passwd",
            "..",
            "../",
            "docs/../../test.txt",
            "./../cdn-other/secret.txt",
        ] {
            assert_eq!(
                kind_of(resolve(request, &policy)),
                RejectionKind::PathEscape,
                "request {request:?}"
            );
        }
    }

    #[test]
    fn test_traversal_back_into_root_is_allowed() {
        let (_tmp, policy) = fixture();
        let resolved = resolve("../cdn/test.txt", &policy).unwrap();
        assert_eq!(
            resolved.as_path(),
            policy.root_directory().join("test.txt")
        );
    }

    #[test]
    fn test_prefix_confusion_sibling_escapes() {
        let (_tmp, policy) = fixture();
        assert_eq!(
            kind_of(resolve("../cdn-other/secret.txt", &policy)),
            RejectionKind::PathEscape
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_absolute_outside_escapes() {
        let (_tmp, policy) = fixture();
        assert_eq!(
            kind_of(resolve("/etc/passwd", &policy)),
            RejectionKind::PathEscape
        );
    }

    #[test]
    fn test_absolute_inside_root_is_contained() {
        let (_tmp, policy) = fixture();
        let inside = policy.root_directory().join("test.txt");
        let resolved = resolve(inside.to_str().unwrap(), &policy).unwrap();
        assert_eq!(resolved.as_path(), inside);
    }

    #[test]
    fn test_escape_reason_hides_path() {
        let (_tmp, policy) = fixture();
        let rejection = resolve("../cdn-other/secret.txt", &policy).unwrap_err();
        assert!(!rejection.reason().contains("cdn-other"));
        assert!(!rejection
            .reason()
            .contains(policy.root_directory().to_str().unwrap()));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_out_of_root_escapes() {
        let (tmp, policy) = fixture();
        std::os::unix::fs::symlink(
            tmp.path().join("cdn-other"),
            policy.root_directory().join("shortcut"),
        )
        .unwrap();

        assert_eq!(
            kind_of(resolve("shortcut/secret.txt", &policy)),
            RejectionKind::PathEscape
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_within_root_resolves_to_target() {
        let (_tmp, policy) = fixture();
        let root = policy.root_directory();
        std::os::unix::fs::symlink(root.join("docs/readme.txt"), root.join("alias.txt"))
            .unwrap();

        let resolved = resolve("alias.txt", &policy).unwrap();
        assert_eq!(resolved.as_path(), root.join("docs/readme.txt"));
    }

    #[test]
    #[cfg(unix)]
    fn test_missing_tail_under_escaping_symlink_escapes() {
        let (tmp, policy) = fixture();
        std::os::unix::fs::symlink(
            tmp.path().join("cdn-other"),
            policy.root_directory().join("shortcut"),
        )
        .unwrap();

        assert_eq!(
            kind_of(resolve("shortcut/not-there.txt", &policy)),
            RejectionKind::PathEscape
        );
    }

    #[test]
    fn test_nul_byte_is_not_found() {
        let (_tmp, policy) = fixture();
        assert_eq!(
            kind_of(resolve("test\0.txt", &policy)),
            RejectionKind::NotFound
        );
    }

    #[test]
    fn test_overlong_file_name_is_not_found() {
        let (_tmp, policy) = fixture();
        let request = format!("{}.txt", "a".repeat(300));
        assert_eq!(kind_of(resolve(&request, &policy)), RejectionKind::NotFound);

        let nested = format!("docs/{}/readme.txt", "b".repeat(300));
        assert_eq!(kind_of(resolve(&nested, &policy)), RejectionKind::NotFound);
    }

    #[test]
    fn test_file_used_as_directory_stays_contained() {
        let (_tmp, policy) = fixture();
        let resolved = resolve("test.txt/child", &policy).unwrap();
        assert_eq!(
            resolved.as_path(),
            policy.root_directory().join("test.txt/child")
        );
    }
}
