//! Plaintext item index.
//!
//! The index is one record holding the metadata of every item, kept in
//! plaintext so lists can be rendered without touching the master key.
//! It is read-modify-written as a unit; mutations are serialized inside
//! `IndexStore` so concurrent imports cannot drop each other's entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::Zeroize;

use lockbox_common::{Error, ItemId, Result};
use lockbox_storage::KeyValueStore;

/// Store key of the index record.
pub const INDEX_KEY: &str = "vault:index";

/// Index format version.
pub const INDEX_VERSION: u32 = 1;

/// Metadata of one vault item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItemMeta {
    pub id: ItemId,
    /// Original file name, shown to the user.
    pub name: String,
    pub mime: String,
    /// Size of the original document in bytes.
    pub size: u64,
    /// Import time; never changes afterwards.
    #[serde(rename = "createdAtISO")]
    pub created_at: DateTime<Utc>,
}

/// The catalog of all items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultIndex {
    pub version: u32,
    pub items: Vec<VaultItemMeta>,
}

impl Default for VaultIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            items: Vec::new(),
        }
    }
}

impl VaultIndex {
    /// Sort newest first. Stable, so among equal timestamps the entry
    /// placed first stays first.
    fn sort_newest_first(&mut self) {
        self.items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

/// Transient plaintext reconstruction of an item.
///
/// This is also the encrypted payload of every envelope. It only lives for
/// the duration of one materialize or export call; the content is zeroized
/// on drop.
#[derive(Clone, Serialize, Deserialize)]
pub struct VaultDecryptedItem {
    pub meta: VaultItemMeta,
    #[serde(rename = "contentBase64")]
    pub content_base64: String,
}

impl Drop for VaultDecryptedItem {
    fn drop(&mut self) {
        self.content_base64.zeroize();
    }
}

impl std::fmt::Debug for VaultDecryptedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultDecryptedItem")
            .field("meta", &self.meta)
            .field("content_base64", &"[REDACTED]")
            .finish()
    }
}

/// Persistence of the index record.
pub struct IndexStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl IndexStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the index; a missing record is an empty index.
    pub async fn load(&self) -> Result<VaultIndex> {
        match self.store.get(INDEX_KEY).await? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            None => Ok(VaultIndex::default()),
        }
    }

    async fn save(&self, index: &VaultIndex) -> Result<()> {
        let bytes = serde_json::to_vec(index).map_err(|e| Error::Serialization(e.to_string()))?;
        self.store.set(INDEX_KEY, bytes).await
    }

    /// All items, newest first.
    pub async fn list(&self) -> Result<Vec<VaultItemMeta>> {
        let mut index = self.load().await?;
        index.sort_newest_first();
        Ok(index.items)
    }

    /// Look up one item.
    pub async fn get(&self, id: &ItemId) -> Result<Option<VaultItemMeta>> {
        Ok(self
            .load()
            .await?
            .items
            .into_iter()
            .find(|m| &m.id == id))
    }

    /// Insert `meta` (replacing an entry with the same id) and re-sort.
    pub async fn upsert(&self, meta: VaultItemMeta) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load().await?;

        index.items.retain(|m| m.id != meta.id);
        debug!(id = %meta.id, "Index upsert");
        index.items.insert(0, meta);
        index.sort_newest_first();

        self.save(&index).await
    }

    /// Remove the entry for `id`.
    ///
    /// # Returns
    /// Whether an entry was removed.
    pub async fn remove(&self, id: &ItemId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load().await?;

        let before = index.items.len();
        index.items.retain(|m| &m.id != id);
        if index.items.len() == before {
            return Ok(false);
        }

        self.save(&index).await?;
        Ok(true)
    }

    /// Keep only entries for which `keep` returns true.
    ///
    /// # Returns
    /// The removed entries.
    pub async fn retain<F>(&self, mut keep: F) -> Result<Vec<VaultItemMeta>>
    where
        F: FnMut(&VaultItemMeta) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load().await?;

        let (kept, removed): (Vec<_>, Vec<_>) =
            index.items.into_iter().partition(|m| keep(m));
        index.items = kept;

        if !removed.is_empty() {
            self.save(&index).await?;
        }
        Ok(removed)
    }

    /// Delete the index record.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(INDEX_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lockbox_storage::MemoryStore;

    fn meta(id: &str, secs: i64) -> VaultItemMeta {
        VaultItemMeta {
            id: ItemId::new(id).unwrap(),
            name: format!("{}.txt", id),
            mime: "text/plain".to_string(),
            size: 1,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn store() -> IndexStore {
        IndexStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_empty_index() {
        let index = store();
        assert!(index.list().await.unwrap().is_empty());
        assert_eq!(index.load().await.unwrap().version, INDEX_VERSION);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let index = store();
        index.upsert(meta("old", 100)).await.unwrap();
        index.upsert(meta("new", 300)).await.unwrap();
        index.upsert(meta("mid", 200)).await.unwrap();

        let ids: Vec<_> = index
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let index = store();
        index.upsert(meta("a", 100)).await.unwrap();

        let mut renamed = meta("a", 100);
        renamed.name = "renamed.txt".to_string();
        index.upsert(renamed).await.unwrap();

        let items = index.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "renamed.txt");
    }

    #[tokio::test]
    async fn test_remove() {
        let index = store();
        index.upsert(meta("a", 1)).await.unwrap();
        index.upsert(meta("b", 2)).await.unwrap();

        assert!(index.remove(&ItemId::new("a").unwrap()).await.unwrap());
        assert!(!index.remove(&ItemId::new("a").unwrap()).await.unwrap());

        let items = index.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(index.get(&ItemId::new("a").unwrap()).await.unwrap().is_none());
        assert!(index.get(&ItemId::new("b").unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retain_returns_removed() {
        let index = store();
        index.upsert(meta("a", 1)).await.unwrap();
        index.upsert(meta("b", 2)).await.unwrap();

        let removed = index.retain(|m| m.id.as_str() == "b").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id.as_str(), "a");
        assert_eq!(index.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let index = store();
        index.upsert(meta("a", 1)).await.unwrap();
        index.clear().await.unwrap();
        assert!(index.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_are_not_lost() {
        let index = Arc::new(store());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let index = index.clone();
            tasks.push(tokio::spawn(async move {
                index.upsert(meta(&format!("item-{}", i), i)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(index.list().await.unwrap().len(), 16);
    }

    #[test]
    fn test_meta_wire_format() {
        let json = serde_json::to_value(meta("a", 0)).unwrap();
        assert!(json.get("createdAtISO").is_some());
        assert_eq!(json["id"], "a");
    }

    #[test]
    fn test_decrypted_item_debug_redacts_content() {
        let item = VaultDecryptedItem {
            meta: meta("a", 0),
            content_base64: "c2VjcmV0".to_string(),
        };
        assert!(!format!("{:?}", item).contains("c2VjcmV0"));
    }
}
