//! # CDN Guard
//!
//! This crate wraps the `access` guard into something a process can run:
//! configuration, API keys, and a response adapter.
//!
//! ## Overview
//!
//! - **Configuration**: TOML file with environment overrides, turned into
//!   an `access::PolicyConfig`
//! - **File Serving**: rejection kinds mapped to status codes, granted files
//!   read on the async runtime
//! - **API Keys**: issued, validated and revoked keys with digest-only
//!   persistence
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    AccessAdapter                     │
//! ├──────────────────────────────────────────────────────┤
//! │                                                      │
//! │  ┌──────────────┐      ┌──────────────────────────┐  │
//! │  │ ApiKeyStore  │ ───▶ │  access::check (guard)   │  │
//! │  │  (optional)  │      │  on the blocking pool    │  │
//! │  └──────────────┘      └──────────────────────────┘  │
//! │                                   │                  │
//! │                                   ▼                  │
//! │                        ┌──────────────────────────┐  │
//! │                        │   tokio::fs::read        │  │
//! │                        └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cdn::{AccessAdapter, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let adapter = AccessAdapter::new(config.build_policy()?);
//!     let response = adapter.serve("images/logo.png").await;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Response adapter
//! - [`keys`]: API key store

pub mod config;
pub mod files;
pub mod keys;

// Re-export access for convenience
pub use access;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export files types for convenience
pub use files::{status_for, AccessAdapter, AccessResponse, ErrorBody, ResponseBody};

// Re-export key types for convenience
pub use keys::{ApiKeyEntry, ApiKeyStore};
