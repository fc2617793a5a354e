//! # CDN Guard Access Library
//!
//! This crate decides whether a caller-supplied path may be served from a
//! directory, and if so, which file on disk it refers to.
//!
//! ## Overview
//!
//! - **Policy**: the served root (canonicalized once), an optional
//!   extension allow-list and an optional size limit
//! - **Resolver**: lexical normalization, symlink resolution and a
//!   separator-aware containment check against the root
//! - **Guard**: existence, file type, extension and size checks on top of
//!   the resolver, producing a [`Verdict`]
//! - **Errors**: the [`Rejection`] taxonomy returned as values
//!
//! ## Flow
//!
//! ```text
//! "docs/../a.txt"
//!       │
//!       ▼
//! ┌─────────────┐   MissingPath / PathEscape
//! │  resolver   │ ─────────────────────────────┐
//! └─────────────┘                              │
//!       │ ContainedPath                        │
//!       ▼                                      ▼
//! ┌─────────────┐   NotFound / InvalidFileType /   Rejection
//! │    guard    │   ExtensionNotAllowed / FileTooLarge /
//! └─────────────┘   PermissionDenied / InternalError
//!       │
//!       ▼
//!   SafePath
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use access::{check, PolicyConfig, PolicyOverrides, RejectionKind};
//!
//! let policy = PolicyConfig::from_overrides(
//!     PolicyOverrides::default()
//!         .root_directory("/srv/cdn")
//!         .allowed_extensions([".txt", ".png"]),
//! )?;
//!
//! match check("images/logo.png", &policy) {
//!     Ok(safe) => println!("serving {} ({} bytes)", safe, safe.size()),
//!     Err(rejection) if rejection.kind() == RejectionKind::PathEscape => {
//!         eprintln!("traversal attempt: {}", rejection);
//!     }
//!     Err(rejection) => eprintln!("rejected: {}", rejection),
//! }
//! # Ok::<(), access::PolicyError>(())
//! ```
//!
//! ## Modules
//!
//! - [`policy`]: Policy construction and defaults
//! - [`resolver`]: Normalization and containment
//! - [`guard`]: Full access verdicts
//! - [`error`]: Error types

pub mod error;
pub mod guard;
pub mod policy;
pub mod resolver;

pub use error::{PolicyError, Rejection, RejectionKind};
pub use guard::{check, extension_of, SafePath, Verdict};
pub use policy::{
    PolicyConfig, PolicyOverrides, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_ROOT_DIR_NAME,
};
pub use resolver::{is_within, normalize, resolve, ContainedPath};
