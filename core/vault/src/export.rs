//! Export of the whole vault as one plaintext JSON bundle.
//!
//! Exported content is outside the vault's protection. Asking the user for
//! confirmation is up to the caller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::index::VaultDecryptedItem;
use crate::materialize::Handle;
use crate::vault::DocumentVault;
use lockbox_common::{Error, Result, SensitiveBytes};

/// Bundle format version.
pub const EXPORT_VERSION: u32 = 1;

/// MIME type of the delivered bundle.
pub const EXPORT_MIME: &str = "application/json";

/// Every item of the vault, decrypted.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportBundle {
    pub version: u32,
    pub items: Vec<VaultDecryptedItem>,
}

impl ExportBundle {
    pub fn to_json(&self) -> Result<SensitiveBytes> {
        serde_json::to_vec_pretty(self)
            .map(SensitiveBytes::new)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// File name of a bundle exported now.
fn export_file_name() -> String {
    format!("vault-export-{}.json", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

impl DocumentVault {
    /// Decrypt every indexed item into a bundle, newest first.
    pub async fn export_bundle(&self) -> Result<ExportBundle> {
        self.export_bundle_with(&CancellationToken::new()).await
    }

    /// Decrypt every indexed item, giving up with `Cancelled` once `cancel`
    /// fires.
    ///
    /// # Errors
    /// - `NotFound` if an indexed item has no envelope
    /// - Decryption failure
    /// - `Cancelled`
    pub async fn export_bundle_with(&self, cancel: &CancellationToken) -> Result<ExportBundle> {
        let metas = self.list_items().await?;
        let key = self.ensure_master_key().await?;

        let mut items = Vec::with_capacity(metas.len());
        for meta in &metas {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let opened = self.open_item(&key, meta).await?;
            // The index entry is authoritative for metadata.
            items.push(VaultDecryptedItem {
                meta: meta.clone(),
                content_base64: opened.content_base64.clone(),
            });
            debug!(id = %meta.id, "Exported item");
        }

        Ok(ExportBundle {
            version: EXPORT_VERSION,
            items,
        })
    }

    /// Export the whole vault and deliver it like a materialized item.
    pub async fn export_all_to_json(&self) -> Result<Handle> {
        self.export_all_to_json_with(&CancellationToken::new()).await
    }

    /// Export the whole vault, giving up with `Cancelled` once `cancel`
    /// fires. A cancelled export delivers nothing.
    pub async fn export_all_to_json_with(&self, cancel: &CancellationToken) -> Result<Handle> {
        let bundle = self.export_bundle_with(cancel).await?;
        let json = bundle.to_json()?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let handle = self
            .materializer
            .deliver(&export_file_name(), EXPORT_MIME, json)
            .await?;
        info!(count = bundle.items.len(), "Vault exported");
        Ok(handle)
    }
}
