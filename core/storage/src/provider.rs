//! Key-value store trait definition.

use async_trait::async_trait;

use lockbox_common::Result;

/// Key-value persistence store for vault records.
///
/// Each call is independent: the trait offers no multi-key transactions,
/// so callers that write two records must tolerate a failure in between.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// `None` if no record exists.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `value` under `key`, replacing any existing record.
    ///
    /// # Postconditions
    /// - A subsequent `get` returns `value`
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove the record under `key`.
    ///
    /// Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
