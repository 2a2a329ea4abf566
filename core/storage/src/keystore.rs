//! Secure keystore for the master key.
//!
//! Entries are text secrets addressed by id. Survival of entries across
//! app reinstall is up to the platform, not to this crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use zeroize::Zeroizing;

use lockbox_common::{Error, Result};

/// Platform secure keystore.
#[async_trait]
pub trait SecureKeystore: Send + Sync {
    /// Get the backend name (e.g., "memory", "os").
    fn name(&self) -> &str;

    /// Read the secret stored under `id`, `None` if absent.
    async fn get(&self, id: &str) -> Result<Option<Zeroizing<String>>>;

    /// Store `secret` under `id`, replacing any existing entry.
    async fn set(&self, id: &str, secret: &str) -> Result<()>;

    /// Remove the entry under `id`. Removing an absent entry succeeds.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory keystore for testing.
///
/// Clones share the same entries, so a test can inspect what a vault wrote.
#[derive(Clone, Default)]
pub struct MemoryKeystore {
    entries: Arc<RwLock<HashMap<String, Zeroizing<String>>>>,
}

impl MemoryKeystore {
    /// Create an empty keystore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an entry exists.
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(id))
            .unwrap_or(false)
    }
}

fn poisoned() -> Error {
    Error::Storage("Keystore lock poisoned".to_string())
}

#[async_trait]
impl SecureKeystore for MemoryKeystore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<Option<Zeroizing<String>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(id).cloned())
    }

    async fn set(&self, id: &str, secret: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(id.to_string(), Zeroizing::new(secret.to_string()));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(id);
        Ok(())
    }
}

/// Platform keychain via the `keyring` crate: macOS Keychain, Windows
/// Credential Manager, and on Linux the Secret Service with the kernel
/// keyring as a session cache. Entries survive a reboot on every platform.
pub struct OsKeystore {
    service: String,
}

impl OsKeystore {
    /// Create a keystore scoped to `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Run a blocking keychain call off the async runtime.
    async fn with_entry<T, F>(&self, id: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &id)
                .map_err(|e| Error::Storage(format!("keyring init: {}", e)))?;
            op(entry).map_err(|e| Error::Storage(format!("keyring: {}", e)))
        })
        .await
        .map_err(|e| Error::Storage(format!("keyring task failed: {}", e)))?
    }
}

#[async_trait]
impl SecureKeystore for OsKeystore {
    fn name(&self) -> &str {
        "os"
    }

    async fn get(&self, id: &str) -> Result<Option<Zeroizing<String>>> {
        self.with_entry(id, |entry| match entry.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, id: &str, secret: &str) -> Result<()> {
        let secret = Zeroizing::new(secret.to_string());
        self.with_entry(id, move |entry| entry.set_password(&secret))
            .await?;
        debug!(service = %self.service, id, "Keystore entry written");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.with_entry(id, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_keystore_roundtrip() {
        let store = MemoryKeystore::new();
        assert!(store.get("key").await.unwrap().is_none());

        store.set("key", "c2VjcmV0").await.unwrap();
        assert_eq!(store.get("key").await.unwrap().unwrap().as_str(), "c2VjcmV0");
        assert!(store.contains("key"));

        store.delete("key").await.unwrap();
        store.delete("key").await.unwrap();
        assert!(!store.contains("key"));
    }

    #[tokio::test]
    #[ignore = "needs an unlocked platform keychain"]
    async fn test_os_keystore_roundtrip() {
        let store = OsKeystore::new("lockbox-test");
        let id = format!("roundtrip-{}", uuid::Uuid::new_v4());

        store.set(&id, "c2VjcmV0").await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().as_str(), "c2VjcmV0");

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
        store.delete(&id).await.unwrap();
    }

    #[test]
    fn test_os_keystore_name() {
        assert_eq!(OsKeystore::new("lockbox-test").name(), "os");
    }
}
