//! The document vault facade.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{CANONICAL_KEY_ID, LEGACY_KEY_IDS};
use crate::index::{IndexStore, VaultDecryptedItem, VaultItemMeta};
use crate::items::ItemStore;
use crate::keys::MasterKeyManager;
use crate::materialize::{BlobRegistry, Handle, MaterializeTarget, Materializer};
use lockbox_common::{Error, ItemId, Result, SensitiveBytes};
use lockbox_crypto::{decrypt, encrypt_with, Envelope, MasterKey, OsRandom, RandomSource};
use lockbox_storage::{KeyValueStore, SecureKeystore};

/// Encrypted local document vault.
///
/// Holds the master key manager, the index and the envelope records, and
/// the materializer for the configured delivery target.
pub struct DocumentVault {
    pub(crate) keys: MasterKeyManager,
    pub(crate) index: IndexStore,
    pub(crate) items: ItemStore,
    pub(crate) materializer: Materializer,
    pub(crate) random: Arc<dyn RandomSource>,
    /// Shared by every two-record write (envelope then index entry);
    /// taken exclusively by passes that walk both stores.
    pub(crate) commit_gate: RwLock<()>,
}

/// Decrypted bytes of one item, for saving a copy outside the vault.
///
/// The bytes are zeroized on drop.
pub struct DecryptedCopy {
    pub name: String,
    pub mime: String,
    pub bytes: SensitiveBytes,
}

impl std::fmt::Debug for DecryptedCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCopy")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &format_args!("[REDACTED; {} bytes]", self.bytes.len()))
            .finish()
    }
}

/// Outcome of reconciling the index with the envelope records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Stored envelope ids that had no index entry (now deleted).
    pub orphan_envelopes: Vec<String>,
    /// Index entries that had no envelope (now dropped).
    pub dangling_entries: Vec<ItemId>,
}

impl RepairReport {
    /// Check if the stores were already consistent.
    pub fn is_clean(&self) -> bool {
        self.orphan_envelopes.is_empty() && self.dangling_entries.is_empty()
    }
}

/// Builder for `DocumentVault`.
pub struct DocumentVaultBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    keystore: Option<Arc<dyn SecureKeystore>>,
    random: Arc<dyn RandomSource>,
    canonical_id: String,
    legacy_ids: Vec<String>,
    target: MaterializeTarget,
    scratch_dir: PathBuf,
    registry: BlobRegistry,
}

impl Default for DocumentVaultBuilder {
    fn default() -> Self {
        Self {
            store: None,
            keystore: None,
            random: Arc::new(OsRandom),
            canonical_id: CANONICAL_KEY_ID.to_string(),
            legacy_ids: LEGACY_KEY_IDS.iter().map(|s| s.to_string()).collect(),
            target: MaterializeTarget::Filesystem,
            scratch_dir: std::env::temp_dir().join("lockbox"),
            registry: BlobRegistry::global().clone(),
        }
    }
}

impl DocumentVaultBuilder {
    /// Key-value store for index and envelope records.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Secure keystore holding the master key.
    pub fn keystore(mut self, keystore: Arc<dyn SecureKeystore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    /// Random source for keys and nonces.
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn key_ids(mut self, canonical_id: impl Into<String>, legacy_ids: Vec<String>) -> Self {
        self.canonical_id = canonical_id.into();
        self.legacy_ids = legacy_ids;
        self
    }

    pub fn target(mut self, target: MaterializeTarget) -> Self {
        self.target = target;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Blob registry for ephemeral handles (default: the process-wide one).
    pub fn blob_registry(mut self, registry: BlobRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// # Errors
    /// - Store or keystore not set
    pub fn build(self) -> Result<DocumentVault> {
        let store = self
            .store
            .ok_or_else(|| Error::InvalidInput("Vault store not set".to_string()))?;
        let keystore = self
            .keystore
            .ok_or_else(|| Error::InvalidInput("Vault keystore not set".to_string()))?;

        Ok(DocumentVault {
            keys: MasterKeyManager::new(
                keystore,
                self.random.clone(),
                self.canonical_id,
                self.legacy_ids,
            ),
            index: IndexStore::new(store.clone()),
            items: ItemStore::new(store),
            materializer: Materializer::new(self.target, self.scratch_dir, self.registry),
            random: self.random,
            commit_gate: RwLock::new(()),
        })
    }
}

impl DocumentVault {
    pub fn builder() -> DocumentVaultBuilder {
        DocumentVaultBuilder::default()
    }

    /// Delivery target of materialize and export.
    pub fn target(&self) -> MaterializeTarget {
        self.materializer.target()
    }

    /// Return the master key, creating or migrating it on first use.
    pub async fn ensure_master_key(&self) -> Result<MasterKey> {
        self.keys.ensure_master_key().await
    }

    /// Check whether a master key exists, without creating one.
    pub async fn has_master_key(&self) -> Result<bool> {
        self.keys.has_master_key().await
    }

    /// All items, newest first. Does not touch the master key.
    pub async fn list_items(&self) -> Result<Vec<VaultItemMeta>> {
        self.index.list().await
    }

    /// Index entry of one item.
    ///
    /// # Errors
    /// - `NotFound` if no entry exists
    pub async fn get_item(&self, id: &ItemId) -> Result<VaultItemMeta> {
        self.index
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item not found: {}", id)))
    }

    pub(crate) fn seal(&self, key: &MasterKey, item: &VaultDecryptedItem) -> Result<Envelope> {
        let payload = Zeroizing::new(
            serde_json::to_vec(item).map_err(|e| Error::Serialization(e.to_string()))?,
        );
        encrypt_with(self.random.as_ref(), key, &payload)
    }

    /// Decrypt the payload of one item.
    ///
    /// # Errors
    /// - `NotFound` if the index entry or the envelope is missing
    /// - `Crypto("decryption failed")` for any unreadable envelope
    pub(crate) async fn open_item(
        &self,
        key: &MasterKey,
        meta: &VaultItemMeta,
    ) -> Result<VaultDecryptedItem> {
        let envelope = self
            .items
            .get(&meta.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Envelope not found: {}", meta.id)))?;

        let payload = Zeroizing::new(decrypt(key, &envelope)?);
        serde_json::from_slice(&payload).map_err(|_| Error::decryption_failed())
    }

    async fn decrypt_content(
        &self,
        id: &ItemId,
    ) -> Result<(VaultItemMeta, SensitiveBytes)> {
        let meta = self.get_item(id).await?;
        let key = self.ensure_master_key().await?;
        let item = self.open_item(&key, &meta).await?;

        let bytes = STANDARD
            .decode(&item.content_base64)
            .map(SensitiveBytes::new)
            .map_err(|_| Error::decryption_failed())?;
        Ok((item.meta.clone(), bytes))
    }

    /// Decrypt one item and hand it out for viewing or sharing.
    ///
    /// # Postconditions
    /// - The handle shows the original name and MIME type
    /// - An ephemeral handle holds the bytes until revoked or dropped
    /// - A temp file stays on disk until `cleanup()`
    ///
    /// # Errors
    /// - `NotFound` if the item or its envelope is absent
    /// - Decryption failure
    /// - Scratch directory write failure
    pub async fn materialize_for_open(&self, id: &ItemId) -> Result<Handle> {
        debug!(id = %id, "Materializing item");
        let (meta, bytes) = self.decrypt_content(id).await?;
        let handle = self.materializer.deliver(&meta.name, &meta.mime, bytes).await?;
        info!(id = %id, target = ?self.target(), "Item materialized");
        Ok(handle)
    }

    /// Decrypt one item for the external save-a-copy flow.
    ///
    /// # Errors
    /// Same as `materialize_for_open`, minus delivery failures.
    pub async fn decrypted_copy(&self, id: &ItemId) -> Result<DecryptedCopy> {
        let (meta, bytes) = self.decrypt_content(id).await?;
        debug!(id = %id, size = bytes.len(), "Decrypted copy");
        Ok(DecryptedCopy {
            name: meta.name,
            mime: meta.mime,
            bytes,
        })
    }

    /// Remove one item's envelope and index entry.
    ///
    /// Deleting an absent item succeeds.
    pub async fn delete_one(&self, id: &ItemId) -> Result<()> {
        let _gate = self.commit_gate.read().await;
        self.items.delete(id).await?;
        let removed = self.index.remove(id).await?;
        info!(id = %id, removed, "Item deleted");
        Ok(())
    }

    /// Erase the whole vault.
    ///
    /// Envelopes are removed best-effort, then the index is cleared, then
    /// the master key is deleted. Key deletion always runs; it alone makes
    /// every remaining envelope unreadable.
    ///
    /// # Errors
    /// - Index clear failure, reported after the key is gone
    pub async fn delete_all(&self) -> Result<()> {
        let _gate = self.commit_gate.write().await;
        let mut ids: HashSet<String> = match self.index.load().await {
            Ok(index) => index.items.into_iter().map(|m| m.id.to_string()).collect(),
            Err(e) => {
                warn!(error = %e, "Index unreadable during delete-all");
                HashSet::new()
            }
        };
        match self.items.stored_ids().await {
            Ok(stored) => ids.extend(stored),
            Err(e) => warn!(error = %e, "Failed to list stored envelopes"),
        }

        for id in &ids {
            if let Err(e) = self.items.delete_stored(id).await {
                warn!(id = %id, error = %e, "Failed to delete envelope");
            }
        }

        let cleared = self.index.clear().await;
        self.keys.delete_master_key().await;

        info!(count = ids.len(), "Vault erased");
        cleared
    }

    /// Reconcile the index with the stored envelopes.
    ///
    /// Imports and deletes in flight finish before the pass starts and
    /// new ones wait for it, so a half-committed import is never taken
    /// for an orphan.
    ///
    /// # Postconditions
    /// - Every index entry has an envelope and every envelope an entry
    pub async fn repair(&self) -> Result<RepairReport> {
        let _gate = self.commit_gate.write().await;
        let stored: HashSet<String> = self.items.stored_ids().await?.into_iter().collect();

        let dangling = self
            .index
            .retain(|m| stored.contains(m.id.as_str()))
            .await?;

        let indexed: HashSet<String> = self
            .index
            .load()
            .await?
            .items
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();

        let mut orphans: Vec<String> = stored.difference(&indexed).cloned().collect();
        orphans.sort();
        for id in &orphans {
            self.items.delete_stored(id).await?;
        }

        let report = RepairReport {
            orphan_envelopes: orphans,
            dangling_entries: dangling.into_iter().map(|m| m.id).collect(),
        };
        if report.is_clean() {
            debug!("Vault consistent");
        } else {
            warn!(
                orphans = report.orphan_envelopes.len(),
                dangling = report.dangling_entries.len(),
                "Repaired vault"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{ByteSource, PickedFile, PickerResult};
    use crate::index::INDEX_KEY;
    use lockbox_storage::{MemoryKeystore, MemoryStore};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        vault: DocumentVault,
        store: MemoryStore,
        keystore: MemoryKeystore,
        registry: BlobRegistry,
        _scratch: TempDir,
    }

    fn fixture(target: MaterializeTarget) -> Fixture {
        let store = MemoryStore::new();
        let keystore = MemoryKeystore::new();
        let registry = BlobRegistry::new();
        let scratch = TempDir::new().unwrap();

        let vault = DocumentVault::builder()
            .store(Arc::new(store.clone()))
            .keystore(Arc::new(keystore.clone()))
            .target(target)
            .scratch_dir(scratch.path())
            .blob_registry(registry.clone())
            .build()
            .unwrap();

        Fixture {
            vault,
            store,
            keystore,
            registry,
            _scratch: scratch,
        }
    }

    async fn import(vault: &DocumentVault, name: &str, bytes: &[u8]) -> VaultItemMeta {
        vault
            .import_from_source(name, None, None, ByteSource::Bytes(bytes.to_vec()))
            .await
            .unwrap()
    }

    #[test]
    fn test_builder_requires_stores() {
        assert!(matches!(
            DocumentVault::builder().build(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_master_key_is_stable() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let first = f.vault.ensure_master_key().await.unwrap();
        let second = f.vault.ensure_master_key().await.unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[tokio::test]
    async fn test_list_does_not_create_key() {
        let f = fixture(MaterializeTarget::Ephemeral);
        assert!(f.vault.list_items().await.unwrap().is_empty());
        assert!(!f.keystore.contains(CANONICAL_KEY_ID));
    }

    #[tokio::test]
    async fn test_import_then_list() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let meta = f
            .vault
            .import_from_source(
                "a.png",
                Some("image/png"),
                Some(3),
                ByteSource::Bytes(vec![1, 2, 3]),
            )
            .await
            .unwrap();

        let items = f.vault.list_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], meta);
        assert_eq!(items[0].name, "a.png");
        assert_eq!(items[0].mime, "image/png");
        assert_eq!(items[0].size, 3);
        assert_eq!(f.vault.get_item(&meta.id).await.unwrap(), meta);
    }

    #[tokio::test]
    async fn test_png_scenario() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let png = [0x89u8, 0x50, 0x4e];

        let picked = PickedFile::new("test.png", ByteSource::Bytes(png.to_vec()));
        let meta = f
            .vault
            .import_from_picker(PickerResult::Picked(picked))
            .await
            .unwrap()
            .unwrap();

        let items = f.vault.list_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "test.png");
        assert_eq!(items[0].mime, "image/png");
        assert_eq!(items[0].size, 3);

        let handle = f.vault.materialize_for_open(&meta.id).await.unwrap();
        assert_eq!(handle.display_name(), "test.png");
        assert_eq!(handle.mime(), "image/png");
        assert_eq!(handle.read_bytes().await.unwrap(), png);

        handle.release().await.unwrap();
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_materialize_to_temp_file() {
        let f = fixture(MaterializeTarget::Filesystem);
        let meta = f
            .vault
            .import_from_source(
                "scan",
                Some("application/pdf"),
                None,
                ByteSource::Bytes(b"%PDF-1.7".to_vec()),
            )
            .await
            .unwrap();

        let handle = f.vault.materialize_for_open(&meta.id).await.unwrap();
        assert_eq!(handle.display_name(), "scan");
        assert!(handle.location().ends_with("scan.pdf"));
        assert_eq!(handle.read_bytes().await.unwrap(), b"%PDF-1.7");
        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_pick_imports_nothing() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let result = f
            .vault
            .import_from_picker(PickerResult::Cancelled)
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(f.store.is_empty());
        assert!(!f.keystore.contains(CANONICAL_KEY_ID));
    }

    #[tokio::test]
    async fn test_unreadable_source_writes_nothing() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let temp = TempDir::new().unwrap();

        let result = f
            .vault
            .import_from_source(
                "a.txt",
                None,
                None,
                ByteSource::Path(temp.path().join("absent")),
            )
            .await;

        assert!(matches!(result, Err(Error::UnreadableSource(_))));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_import_writes_nothing() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = f
            .vault
            .import_from_source_with(
                "a.txt",
                None,
                None,
                ByteSource::Bytes(b"x".to_vec()),
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(f.vault.list_items().await.unwrap().is_empty());
        assert!(f.vault.items.stored_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_base64_source_is_decoded() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let meta = f
            .vault
            .import_from_source(
                "a.bin",
                None,
                None,
                ByteSource::Base64("AQID\nBAUG".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(meta.size, 6);
        assert_eq!(meta.mime, crate::mime::OCTET_STREAM);
        let copy = f.vault.decrypted_copy(&meta.id).await.unwrap();
        assert_eq!(copy.bytes.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_invalid_base64_is_rejected_before_commit() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let result = f
            .vault
            .import_from_source(
                "a.txt",
                None,
                None,
                ByteSource::Base64("not base64!!".to_string()),
            )
            .await;

        assert!(matches!(result, Err(Error::UnreadableSource(_))));
        assert!(f.vault.list_items().await.unwrap().is_empty());
        assert!(f.store.is_empty());
        assert!(!f.keystore.contains(CANONICAL_KEY_ID));
    }

    #[tokio::test]
    async fn test_same_document_twice_gets_two_ids() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let a = import(&f.vault, "a.txt", b"same").await;
        let b = import(&f.vault, "a.txt", b"same").await;

        assert_ne!(a.id, b.id);
        assert_eq!(f.vault.list_items().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_envelopes_do_not_leak_plaintext() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let meta = import(&f.vault, "secret.txt", b"attack at dawn").await;

        let envelope = f.vault.items.get(&meta.id).await.unwrap().unwrap();
        let stored = String::from_utf8(envelope.to_bytes().unwrap()).unwrap();
        assert!(!stored.contains("secret.txt"));
        assert!(!stored.contains(&STANDARD.encode(b"attack at dawn")));
    }

    #[tokio::test]
    async fn test_delete_one() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let keep = import(&f.vault, "keep.txt", b"1").await;
        let gone = import(&f.vault, "gone.txt", b"2").await;

        f.vault.delete_one(&gone.id).await.unwrap();

        let ids: Vec<_> = f
            .vault
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![keep.id.clone()]);
        assert!(f
            .vault
            .materialize_for_open(&gone.id)
            .await
            .unwrap_err()
            .is_not_found());

        // Idempotent
        f.vault.delete_one(&gone.id).await.unwrap();
        assert!(f.vault.decrypted_copy(&keep.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_envelope_is_not_found() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let meta = import(&f.vault, "a.txt", b"x").await;
        f.vault.items.delete(&meta.id).await.unwrap();

        assert!(f
            .vault
            .materialize_for_open(&meta.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_all_erases_key() {
        let f = fixture(MaterializeTarget::Ephemeral);
        import(&f.vault, "a.txt", b"1").await;
        import(&f.vault, "b.txt", b"2").await;
        let before = f.vault.ensure_master_key().await.unwrap();

        f.vault.delete_all().await.unwrap();

        assert!(f.vault.list_items().await.unwrap().is_empty());
        assert!(f.store.is_empty());
        assert!(!f.keystore.contains(CANONICAL_KEY_ID));

        let after = f.vault.ensure_master_key().await.unwrap();
        assert_ne!(before.as_bytes(), after.as_bytes());
    }

    #[tokio::test]
    async fn test_key_loss_makes_envelopes_unreadable() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let meta = import(&f.vault, "a.txt", b"1").await;

        f.vault.keys.delete_master_key().await;

        match f.vault.decrypted_copy(&meta.id).await {
            Err(Error::Crypto(msg)) => assert_eq!(msg, "decryption failed"),
            other => panic!("expected decryption failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_export_completeness() {
        let f = fixture(MaterializeTarget::Ephemeral);
        import(&f.vault, "a.txt", b"one").await;
        import(&f.vault, "b.png", &[1, 2, 3]).await;

        let listed = f.vault.list_items().await.unwrap();
        let bundle = f.vault.export_bundle().await.unwrap();

        assert_eq!(bundle.version, crate::export::EXPORT_VERSION);
        assert_eq!(bundle.items.len(), listed.len());
        for item in &bundle.items {
            assert!(listed.iter().any(|m| m.id == item.meta.id));
        }
        let png = bundle.items.iter().find(|i| i.meta.name == "b.png").unwrap();
        assert_eq!(png.content_base64, "AQID");
    }

    #[tokio::test]
    async fn test_export_delivers_json() {
        let f = fixture(MaterializeTarget::Filesystem);
        import(&f.vault, "a.txt", b"one").await;

        let handle = f.vault.export_all_to_json().await.unwrap();
        assert_eq!(handle.mime(), "application/json");
        assert!(handle.display_name().starts_with("vault-export-"));

        let json: serde_json::Value =
            serde_json::from_slice(&handle.read_bytes().await.unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["items"][0]["meta"]["name"], "a.txt");
        assert_eq!(json["items"][0]["contentBase64"], "b25l");

        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_export() {
        let f = fixture(MaterializeTarget::Ephemeral);
        import(&f.vault, "a.txt", b"one").await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = f.vault.export_all_to_json_with(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_repair() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let healthy = import(&f.vault, "ok.txt", b"1").await;
        let dangling = import(&f.vault, "dangling.txt", b"2").await;
        let orphan = import(&f.vault, "orphan.txt", b"3").await;

        f.vault.items.delete(&dangling.id).await.unwrap();
        f.vault.index.remove(&orphan.id).await.unwrap();

        let report = f.vault.repair().await.unwrap();
        assert_eq!(report.orphan_envelopes, vec![orphan.id.to_string()]);
        assert_eq!(report.dangling_entries, vec![dangling.id]);

        let ids: Vec<_> = f
            .vault
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![healthy.id.clone()]);
        assert_eq!(
            f.vault.items.stored_ids().await.unwrap(),
            vec![healthy.id.to_string()]
        );

        assert!(f.vault.repair().await.unwrap().is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repair_during_imports_keeps_every_item() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let vault = Arc::new(f.vault);

        let mut imports = Vec::new();
        for i in 0..16 {
            let vault = vault.clone();
            imports.push(tokio::spawn(async move {
                vault
                    .import_from_source(
                        &format!("doc-{}.txt", i),
                        None,
                        None,
                        ByteSource::Bytes(vec![i as u8]),
                    )
                    .await
            }));
        }
        let repairs = {
            let vault = vault.clone();
            tokio::spawn(async move {
                let mut reports = Vec::new();
                for _ in 0..16 {
                    reports.push(vault.repair().await);
                    tokio::task::yield_now().await;
                }
                reports
            })
        };

        for task in imports {
            task.await.unwrap().unwrap();
        }
        for report in repairs.await.unwrap() {
            assert!(report.unwrap().is_clean());
        }

        let items = vault.list_items().await.unwrap();
        assert_eq!(items.len(), 16);
        for meta in &items {
            assert!(vault.decrypted_copy(&meta.id).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_concurrent_imports_are_all_listed() {
        let f = fixture(MaterializeTarget::Ephemeral);
        let vault = Arc::new(f.vault);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let vault = vault.clone();
            tasks.push(tokio::spawn(async move {
                vault
                    .import_from_source(
                        &format!("doc-{}.txt", i),
                        None,
                        None,
                        ByteSource::Bytes(vec![i as u8]),
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(vault.list_items().await.unwrap().len(), 8);
        assert!(f.store.get(INDEX_KEY).await.unwrap().is_some());
    }
}
