//! Per-item envelope records.

use std::sync::Arc;

use lockbox_common::{ItemId, Result};
use lockbox_crypto::Envelope;
use lockbox_storage::KeyValueStore;

/// Store key prefix of envelope records.
pub const ITEM_PREFIX: &str = "vault:item:";

/// Persistence of one encrypted envelope per item id.
pub struct ItemStore {
    store: Arc<dyn KeyValueStore>,
}

impl ItemStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", ITEM_PREFIX, id)
    }

    /// Write the envelope for `id`.
    pub async fn put(&self, id: &ItemId, envelope: &Envelope) -> Result<()> {
        self.store
            .set(&Self::key(id.as_str()), envelope.to_bytes()?)
            .await
    }

    /// Read the envelope for `id`, `None` if absent.
    ///
    /// # Errors
    /// - Storage failure
    /// - A record that is not an envelope (reported as a decryption failure)
    pub async fn get(&self, id: &ItemId) -> Result<Option<Envelope>> {
        match self.store.get(&Self::key(id.as_str())).await? {
            Some(bytes) => Ok(Some(Envelope::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check whether an envelope exists for `id`.
    pub async fn contains(&self, id: &ItemId) -> Result<bool> {
        Ok(self.store.get(&Self::key(id.as_str())).await?.is_some())
    }

    /// Remove the envelope for `id`. Removing an absent envelope succeeds.
    pub async fn delete(&self, id: &ItemId) -> Result<()> {
        self.store.delete(&Self::key(id.as_str())).await
    }

    /// Ids of every stored envelope, as raw strings.
    pub async fn stored_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .keys(ITEM_PREFIX)
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(ITEM_PREFIX).map(str::to_string))
            .collect())
    }

    /// Remove an envelope by raw stored id, including ids that are not
    /// valid `ItemId`s.
    pub async fn delete_stored(&self, raw_id: &str) -> Result<()> {
        self.store.delete(&Self::key(raw_id)).await
    }
}
