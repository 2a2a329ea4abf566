//! Opening a vault from configuration.

use std::sync::Arc;
use tracing::debug;

use crate::config::{KeystoreBackend, VaultConfig};
use crate::vault::DocumentVault;
use lockbox_common::Result;
use lockbox_storage::{
    create_default_registry, MemoryKeystore, OsKeystore, SecureKeystore, StoreRegistry,
};

/// Builds vaults from configuration.
pub struct VaultManager {
    registry: StoreRegistry,
}

impl VaultManager {
    /// Create a new manager with the default stores.
    pub fn new() -> Self {
        Self {
            registry: create_default_registry(),
        }
    }

    /// Open the vault described by `config`.
    ///
    /// Nothing is read or written until the first operation; the master key
    /// is created lazily.
    ///
    /// # Errors
    /// - Store not registered
    /// - Store configuration invalid
    pub fn open(&self, config: &VaultConfig) -> Result<DocumentVault> {
        let store = self
            .registry
            .resolve(&config.storage.provider, config.storage.provider_config())?;

        let keystore: Arc<dyn SecureKeystore> = match config.keystore.backend {
            KeystoreBackend::Os => Arc::new(OsKeystore::new(config.keystore.service.clone())),
            KeystoreBackend::Memory => Arc::new(MemoryKeystore::new()),
        };

        debug!(
            store = %store.name(),
            keystore = %keystore.name(),
            target = ?config.materialize.target,
            "Opening vault"
        );

        DocumentVault::builder()
            .store(store)
            .keystore(keystore)
            .key_ids(
                config.keystore.canonical_id.clone(),
                config.keystore.legacy_ids.clone(),
            )
            .target(config.materialize.target)
            .scratch_dir(config.materialize.scratch_dir.clone())
            .build()
    }
}

impl Default for VaultManager {
    fn default() -> Self {
        Self::new()
    }
}
