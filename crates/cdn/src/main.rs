//! CDN Guard
//!
//! Command-line front end for checking and serving files from a guarded
//! directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cdn::access::PolicyConfig;
use cdn::config::{default_config_path, Config};
use cdn::{AccessAdapter, ApiKeyStore, ResponseBody};

/// CDN Guard - serve a directory without leaking anything outside it.
#[derive(Parser, Debug)]
#[command(name = "cdn-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check whether a path may be served, without reading it
    Check {
        /// Requested path, relative to the served root
        path: String,

        /// Output the response body as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve a file through the guard
    Fetch {
        /// Requested path, relative to the served root
        path: String,

        /// Write the file here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// API key, required when `keys.require_key` is set
        #[arg(long, short)]
        key: Option<String>,
    },

    /// Show the served root and the limits in force
    Status,

    /// Manage API keys
    #[command(subcommand)]
    Keys(KeysCommands),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for API key management.
#[derive(Subcommand, Debug, Clone)]
pub enum KeysCommands {
    /// Issue a new key
    Issue {
        /// Permission to grant (repeatable; defaults to the required permission)
        #[arg(long = "permission", short)]
        permissions: Vec<String>,
    },

    /// Check whether a key is valid
    Validate {
        /// The key to check
        key: String,
    },

    /// Revoke a key
    Revoke {
        /// The key to revoke
        key: String,
    },

    /// List issued keys
    List,

    /// Revoke every key
    Clear,
}

/// Subcommands for configuration.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.server.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Using config file: {:?}", config_path);

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Check { path, json } => {
            let adapter = AccessAdapter::new(config.build_policy()?);
            let response = adapter.check(&path);

            if json {
                println!("{}", response.to_json()?);
            } else {
                match &response.body {
                    ResponseBody::Granted { path, size } => {
                        println!("{} ({} bytes)", path.display(), size)
                    }
                    ResponseBody::Error(body) => eprintln!("{} {}", response.status, body.error),
                    ResponseBody::File { path, .. } => println!("{}", path.display()),
                }
            }

            std::process::exit(if response.is_success() { 0 } else { 1 });
        }
        Commands::Fetch { path, output, key } => {
            let mut adapter = AccessAdapter::new(config.build_policy()?);
            if config.keys.require_key {
                let store = open_key_store(&config)?;
                adapter =
                    adapter.with_key_store(Arc::new(store), config.keys.required_permission.clone());
            }

            let response = adapter.serve_with_key(key.as_deref(), &path).await;
            let Some(bytes) = response.bytes() else {
                if let Some(body) = response.error_body() {
                    eprintln!("{} {}", response.status, body.error);
                }
                std::process::exit(1);
            };

            match output {
                Some(output) => {
                    tokio::fs::write(&output, bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    tracing::info!("Wrote {} bytes to {:?}", bytes.len(), output);
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(bytes).context("Failed to write to stdout")?;
                    stdout.flush().context("Failed to flush stdout")?;
                }
            }
        }
        Commands::Status => {
            let policy = config.build_policy()?;
            print!("{}", status_report(&config, &policy));
        }
        Commands::Keys(cmd) => {
            let store = open_key_store(&config)?;

            match cmd {
                KeysCommands::Issue { permissions } => {
                    let permissions = if permissions.is_empty() {
                        vec![config.keys.required_permission.clone()]
                    } else {
                        permissions
                    };
                    let key = store.issue(permissions)?;
                    store.save()?;
                    println!("{}", key);
                    eprintln!("Store this key now; it cannot be shown again.");
                }
                KeysCommands::Validate { key } => {
                    if store.validate(&key)? {
                        println!("valid");
                    } else {
                        println!("invalid");
                        std::process::exit(1);
                    }
                }
                KeysCommands::Revoke { key } => {
                    if store.revoke(&key)? {
                        store.save()?;
                        println!("Key revoked");
                    } else {
                        eprintln!("Key not found");
                        std::process::exit(1);
                    }
                }
                KeysCommands::List => {
                    let entries = store.list()?;
                    if entries.is_empty() {
                        println!("No API keys issued.");
                    } else {
                        println!("Issued API keys:");
                        for entry in entries {
                            let permissions: Vec<&str> =
                                entry.permissions.iter().map(String::as_str).collect();
                            println!("  {} - [{}]", entry.key_id(), permissions.join(", "));
                        }
                    }
                }
                KeysCommands::Clear => {
                    let count = store.len()?;
                    store.clear()?;
                    store.save()?;
                    println!("Revoked {} API keys", count);
                }
            }
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigCommands::Init { force } => {
                init_config(&config_path, force)?;
                println!("Wrote default configuration to {}", config_path.display());
            }
        },
    }

    Ok(())
}

/// Open the key store named by the configuration.
fn open_key_store(config: &Config) -> anyhow::Result<ApiKeyStore> {
    let store = ApiKeyStore::new(&config.keys.store_path);
    tracing::debug!("Using key store: {:?}", store.path());
    store.load()?;
    Ok(store)
}

/// Human-readable summary of the effective policy.
fn status_report(config: &Config, policy: &PolicyConfig) -> String {
    let extensions = match policy.allowed_extensions() {
        Some(set) => set.iter().cloned().collect::<Vec<_>>().join(" "),
        None => "any".to_string(),
    };
    let max_size = match policy.max_file_size_bytes() {
        Some(max) => format!("{} bytes", max),
        None => "unlimited".to_string(),
    };
    let keys = if config.keys.require_key {
        format!("required (permission: {})", config.keys.required_permission)
    } else {
        "not required".to_string()
    };

    format!(
        "CDN Guard {}\n  Root:       {}\n  Extensions: {}\n  Max size:   {}\n  API keys:   {}\n",
        env!("CARGO_PKG_VERSION"),
        policy.root_directory().display(),
        extensions,
        max_size,
        keys,
    )
}

/// Write the default configuration to `path`.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(path)
}
