//! File serving module.
//!
//! This module sits between a transport and the `access` guard:
//! - Rejection kinds are mapped to status codes and `{"error": ...}` bodies
//! - Granted files are read asynchronously after the check
//! - An optional API key gate runs before the guard
//!
//! # Security
//!
//! Response bodies only ever carry rejection reasons. Resolved paths and
//! I/O error detail go to the log.

pub mod adapter;

pub use adapter::{
    status_for, AccessAdapter, AccessResponse, ErrorBody, ResponseBody, INSUFFICIENT_PERMISSIONS,
    INVALID_API_KEY,
};
