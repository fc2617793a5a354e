//! Configuration management for CDN Guard.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/cdn-guard/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use access::{PolicyConfig, PolicyOverrides};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("max_file_size_bytes must be greater than 0, got {0}")]
    InvalidMaxFileSize(u64),

    #[error("allowed_extensions entries must be non-empty names, got {0:?}")]
    InvalidExtension(String),

    #[error("allowed_extensions cannot be combined with any_extension = true")]
    ConflictingExtensionSettings,

    #[error("max_file_size_bytes cannot be combined with unlimited_size = true")]
    ConflictingSizeSettings,

    #[error("required_permission must not be empty when require_key = true")]
    EmptyRequiredPermission,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Environment variable overriding `policy.root_directory`.
pub const ENV_ROOT_DIRECTORY: &str = "CDN_GUARD_ROOT_DIRECTORY";

/// Environment variable overriding `server.log_level`.
pub const ENV_LOG_LEVEL: &str = "CDN_GUARD_LOG_LEVEL";

/// Main configuration structure for CDN Guard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General process configuration.
    pub server: ServerConfig,

    /// What is served, and under which limits.
    pub policy: PolicySection,

    /// API key settings.
    pub keys: KeysConfig,
}

/// General process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Access policy settings.
///
/// Unset keys fall back to the built-in defaults: `<cwd>/cdn_files`, the
/// common media/document allow-list, and 50 MiB.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PolicySection {
    /// Served root directory. Relative paths resolve against the working
    /// directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_directory: Option<PathBuf>,

    /// Extension allow-list, e.g. `[".txt", ".png"]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,

    /// Serve files regardless of extension.
    pub any_extension: bool,

    /// Maximum served file size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,

    /// Serve files regardless of size.
    pub unlimited_size: bool,
}

/// API key configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeysConfig {
    /// Where issued keys are persisted.
    pub store_path: PathBuf,

    /// Refuse requests that do not present a valid key.
    pub require_key: bool,

    /// Permission a key must carry to read files.
    pub required_permission: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            store_path: default_key_store_path(),
            require_key: false,
            required_permission: "read".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cdn-guard")
        .join("config.toml")
}

/// Returns the default API key store path.
pub fn default_key_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cdn-guard")
        .join("api_keys.json")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - CDN_GUARD_ROOT_DIRECTORY: Override the served root directory
    /// - CDN_GUARD_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(ENV_ROOT_DIRECTORY) {
            if !root.is_empty() {
                tracing::info!("Overriding root_directory from environment: {}", root);
                self.policy.root_directory = Some(PathBuf::from(root));
            }
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.server.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Root directory existence is checked later, when the policy is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        if let Some(extensions) = &self.policy.allowed_extensions {
            if self.policy.any_extension {
                return Err(ConfigError::ConflictingExtensionSettings);
            }
            for ext in extensions {
                let bare = ext.trim().trim_start_matches('.');
                if bare.is_empty() || bare.contains(['/', '\\']) {
                    return Err(ConfigError::InvalidExtension(ext.clone()));
                }
            }
        }

        if let Some(max) = self.policy.max_file_size_bytes {
            if self.policy.unlimited_size {
                return Err(ConfigError::ConflictingSizeSettings);
            }
            if max == 0 {
                return Err(ConfigError::InvalidMaxFileSize(max));
            }
        }

        if self.keys.require_key && self.keys.required_permission.trim().is_empty() {
            return Err(ConfigError::EmptyRequiredPermission);
        }

        Ok(())
    }

    /// Translate the `[policy]` section into overrides for the access crate.
    pub fn policy_overrides(&self) -> PolicyOverrides {
        let section = &self.policy;
        let mut overrides = PolicyOverrides::default();

        if let Some(root) = &section.root_directory {
            overrides = overrides.root_directory(root);
        }

        if section.any_extension {
            overrides = overrides.any_extension();
        } else if let Some(extensions) = &section.allowed_extensions {
            overrides = overrides.allowed_extensions(extensions.iter().cloned());
        }

        if section.unlimited_size {
            overrides = overrides.unlimited_size();
        } else if let Some(max) = section.max_file_size_bytes {
            overrides = overrides.max_file_size_bytes(max);
        }

        overrides
    }

    /// Build the access policy described by this configuration.
    pub fn build_policy(&self) -> Result<PolicyConfig> {
        let policy = PolicyConfig::from_overrides(self.policy_overrides())
            .context("Failed to build access policy")?;

        tracing::info!(
            "Serving files from {:?} (extensions: {}, max size: {})",
            policy.root_directory(),
            policy
                .allowed_extensions()
                .map(|set| set.len().to_string())
                .unwrap_or_else(|| "any".to_string()),
            policy
                .max_file_size_bytes()
                .map(|max| format!("{max} bytes"))
                .unwrap_or_else(|| "unlimited".to_string()),
        );
        Ok(policy)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
