//! Master key lifecycle.
//!
//! Exactly one master key exists per installation. It is created lazily,
//! migrated in from legacy keystore ids, and destroyed only by delete-all.
//! Every create, migrate and delete runs under one lock, so a migration
//! can never interleave with a deletion.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use lockbox_common::{Error, Result};
use lockbox_crypto::{MasterKey, RandomSource};
use lockbox_storage::SecureKeystore;

/// Owner of the master key entry in the secure keystore.
pub struct MasterKeyManager {
    keystore: Arc<dyn SecureKeystore>,
    random: Arc<dyn RandomSource>,
    canonical_id: String,
    legacy_ids: Vec<String>,
    lock: Mutex<()>,
}

impl MasterKeyManager {
    pub fn new(
        keystore: Arc<dyn SecureKeystore>,
        random: Arc<dyn RandomSource>,
        canonical_id: impl Into<String>,
        legacy_ids: Vec<String>,
    ) -> Self {
        Self {
            keystore,
            random,
            canonical_id: canonical_id.into(),
            legacy_ids,
            lock: Mutex::new(()),
        }
    }

    /// Return the master key, creating or migrating it if needed.
    ///
    /// # Postconditions
    /// - The canonical entry holds the returned key
    /// - After a migration, no legacy entry remains
    ///
    /// # Errors
    /// - Keystore failure
    /// - Canonical entry present but not a valid key
    /// - Secure random source unavailable
    pub async fn ensure_master_key(&self) -> Result<MasterKey> {
        let _guard = self.lock.lock().await;

        if let Some(encoded) = self.keystore.get(&self.canonical_id).await? {
            return MasterKey::from_base64(&encoded)
                .map_err(|_| Error::Crypto("Stored master key is corrupt".to_string()));
        }

        if let Some(key) = self.migrate_legacy().await? {
            return Ok(key);
        }

        let key = MasterKey::generate(self.random.as_ref())?;
        self.keystore
            .set(&self.canonical_id, &key.to_base64())
            .await?;
        info!("Generated new master key");
        Ok(key)
    }

    /// Move the first valid legacy key to the canonical id.
    async fn migrate_legacy(&self) -> Result<Option<MasterKey>> {
        for legacy_id in &self.legacy_ids {
            let Some(encoded) = self.keystore.get(legacy_id).await? else {
                continue;
            };

            let key = match MasterKey::from_base64(&encoded) {
                Ok(key) => key,
                Err(_) => {
                    warn!(id = %legacy_id, "Skipping unreadable legacy master key");
                    continue;
                }
            };

            self.keystore
                .set(&self.canonical_id, &key.to_base64())
                .await?;
            self.delete_legacy_entries().await;

            info!(from = %legacy_id, "Migrated legacy master key");
            return Ok(Some(key));
        }
        Ok(None)
    }

    async fn delete_legacy_entries(&self) {
        for legacy_id in &self.legacy_ids {
            if let Err(e) = self.keystore.delete(legacy_id).await {
                warn!(id = %legacy_id, error = %e, "Failed to delete legacy key entry");
            }
        }
    }

    /// Remove the canonical and every legacy key entry.
    ///
    /// Failures are logged and swallowed. Once the key is gone every
    /// existing envelope is unreadable, whether or not its bytes remain.
    pub async fn delete_master_key(&self) {
        let _guard = self.lock.lock().await;

        if let Err(e) = self.keystore.delete(&self.canonical_id).await {
            warn!(error = %e, "Failed to delete master key");
        }
        self.delete_legacy_entries().await;
        debug!("Master key entries removed");
    }

    /// Check whether a canonical key entry exists, without creating one.
    pub async fn has_master_key(&self) -> Result<bool> {
        Ok(self.keystore.get(&self.canonical_id).await?.is_some())
    }
}
