//! API key management.
//!
//! This module provides issuing, validating and revoking API keys, with
//! digest-only JSON persistence.

pub mod api_keys;

pub use api_keys::{ApiKeyEntry, ApiKeyStore, KEY_BYTES};
