//! Vault configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::materialize::MaterializeTarget;
use lockbox_common::{Error, Result};

/// Default keychain service name.
pub const DEFAULT_SERVICE: &str = "lockbox";

/// Keystore id of the master key.
pub const CANONICAL_KEY_ID: &str = "lockbox.master-key";

/// Keystore ids used by earlier releases, probed in order during migration.
pub const LEGACY_KEY_IDS: &[&str] = &["vault_master_key", "vaultMasterKey"];

/// Top-level vault configuration.
///
/// Every section has defaults, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Where index and envelope records live.
    pub storage: StorageConfig,
    /// Where the master key lives.
    pub keystore: KeystoreConfig,
    /// How decrypted items are handed out.
    pub materialize: MaterializeConfig,
}

/// Key-value store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Registered store name (e.g., "local", "memory").
    pub provider: String,
    /// Root directory for the local store.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            root: default_data_dir().join("store"),
        }
    }
}

impl StorageConfig {
    /// Configuration value handed to the store factory.
    pub fn provider_config(&self) -> serde_json::Value {
        serde_json::json!({ "root": self.root })
    }
}

/// Keystore backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreBackend {
    /// Platform keychain.
    Os,
    /// Process memory (testing only; the key dies with the process).
    Memory,
}

/// Master key storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    pub backend: KeystoreBackend,
    /// Keychain service name.
    pub service: String,
    /// Id of the canonical key entry.
    pub canonical_id: String,
    /// Legacy entry ids, probed in order.
    pub legacy_ids: Vec<String>,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            backend: KeystoreBackend::Os,
            service: DEFAULT_SERVICE.to_string(),
            canonical_id: CANONICAL_KEY_ID.to_string(),
            legacy_ids: LEGACY_KEY_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Materialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeConfig {
    pub target: MaterializeTarget,
    /// Base directory for temp files.
    pub scratch_dir: PathBuf,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            target: MaterializeTarget::Filesystem,
            scratch_dir: std::env::temp_dir().join("lockbox"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lockbox")
}

impl VaultConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}
