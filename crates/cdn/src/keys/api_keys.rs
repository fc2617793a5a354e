//! API key storage.
//!
//! Keys are 32 random bytes, hex-encoded, handed to the caller exactly once
//! by [`ApiKeyStore::issue`]. The store only keeps the SHA-256 digest of each
//! key, in memory and on disk, so a leaked store file cannot be replayed.
//! The store persists to JSON at the configured `keys.store_path`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use anyhow::{Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of random bytes in an issued key.
pub const KEY_BYTES: usize = 32;

/// Length of the digest prefix shown when listing keys.
const KEY_ID_LEN: usize = 12;

/// A stored key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    /// Hex-encoded SHA-256 digest of the key.
    pub digest: String,
    /// Permissions granted to the key.
    pub permissions: BTreeSet<String>,
    /// When the key was issued.
    pub created_at: SystemTime,
}

impl ApiKeyEntry {
    /// Short identifier for display, derived from the digest.
    pub fn key_id(&self) -> &str {
        &self.digest[..KEY_ID_LEN.min(self.digest.len())]
    }
}

/// Wrapper for serializing the key store.
#[derive(Debug, Serialize, Deserialize)]
struct KeyStoreData {
    /// Version of the store format.
    version: u32,
    /// The stored keys.
    keys: Vec<ApiKeyEntry>,
}

impl Default for KeyStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            keys: Vec::new(),
        }
    }
}

/// Thread-safe store for API keys.
///
/// Mutations do not save automatically; call [`save`](Self::save) after
/// making changes.
pub struct ApiKeyStore {
    path: PathBuf,
    keys: RwLock<HashMap<String, ApiKeyEntry>>,
}

impl ApiKeyStore {
    /// Creates an empty store that will persist to the given path.
    ///
    /// This does not load the file; call `load()` to read existing data.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the store from its JSON file.
    ///
    /// A missing file leaves the store empty.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!("Key store file not found at {:?}, starting empty", self.path);
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read key store: {}", self.path.display()))?;

        let data: KeyStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse key store: {}", self.path.display()))?;

        let mut keys = self
            .keys
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on key store"))?;

        keys.clear();
        for entry in data.keys {
            keys.insert(entry.digest.clone(), entry);
        }

        tracing::info!("Loaded {} API keys from {:?}", keys.len(), self.path);
        Ok(())
    }

    /// Saves the store to its JSON file.
    ///
    /// Writes to a temp file and renames it into place. Creates parent
    /// directories if they don't exist.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create key store directory: {}", parent.display())
            })?;
        }

        let keys = self
            .keys
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))?;

        let mut entries: Vec<ApiKeyEntry> = keys.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let data = KeyStoreData {
            keys: entries,
            ..KeyStoreData::default()
        };

        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize key store")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write temp key store: {}", temp_path.display())
        })?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp key store {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved {} API keys to {:?}", keys.len(), self.path);
        Ok(())
    }

    /// Issues a new key carrying `permissions` and returns it.
    ///
    /// The returned string is the only copy of the key.
    pub fn issue<I, S>(&self, permissions: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut raw = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let key = hex::encode(raw);

        let entry = ApiKeyEntry {
            digest: digest_of(&key),
            permissions: permissions.into_iter().map(Into::into).collect(),
            created_at: SystemTime::now(),
        };

        let mut keys = self
            .keys
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on key store"))?;

        tracing::info!(
            "Issued API key {} with permissions {:?}",
            entry.key_id(),
            entry.permissions
        );
        keys.insert(entry.digest.clone(), entry);
        Ok(key)
    }

    /// Returns true if `key` was issued by this store and not revoked.
    pub fn validate(&self, key: &str) -> Result<bool> {
        let keys = self
            .keys
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))?;

        Ok(keys.contains_key(&digest_of(key)))
    }

    /// Permissions granted to `key`, or `None` if the key is unknown.
    pub fn permissions_of(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        let keys = self
            .keys
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))?;

        Ok(keys.get(&digest_of(key)).map(|e| e.permissions.clone()))
    }

    /// Revokes `key`. Returns `true` if it existed.
    pub fn revoke(&self, key: &str) -> Result<bool> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on key store"))?;

        let removed = keys.remove(&digest_of(key));
        if let Some(ref entry) = removed {
            tracing::info!("Revoked API key {}", entry.key_id());
        }
        Ok(removed.is_some())
    }

    /// Removes every key.
    pub fn clear(&self) -> Result<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on key store"))?;

        tracing::info!("Clearing {} API keys", keys.len());
        keys.clear();
        Ok(())
    }

    /// Lists stored entries, oldest first.
    pub fn list(&self) -> Result<Vec<ApiKeyEntry>> {
        let keys = self
            .keys
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))?;

        let mut entries: Vec<ApiKeyEntry> = keys.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Number of active keys.
    pub fn len(&self) -> Result<usize> {
        let keys = self
            .keys
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))?;
        Ok(keys.len())
    }

    /// Returns true if no keys are active.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Hex-encoded SHA-256 digest of a presented key.
fn digest_of(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
