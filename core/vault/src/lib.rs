//! Encrypted local document vault.
//!
//! This module provides:
//! - Master key lifecycle in the platform keystore, including legacy migration
//! - Per-item envelope encryption of imported documents
//! - The plaintext item index and the per-item envelope records
//! - Import from heterogeneous picked-file inputs
//! - Materialization of one item as an ephemeral reference or a temp file
//! - Export of the whole vault as one JSON bundle
//! - Delete-one, delete-all (cryptographic erasure) and a repair pass
//!
//! # Architecture
//! `DocumentVault` sits between the UI and two independent persisted stores
//! plus the keystore. The index and the envelopes are written separately;
//! a crash between the two writes can leave an orphan on one side, which
//! `DocumentVault::repair` reconciles.

pub mod config;
pub mod export;
pub mod import;
pub mod index;
pub mod items;
pub mod keys;
pub mod manager;
pub mod materialize;
pub mod mime;
pub mod vault;

pub use config::{KeystoreBackend, VaultConfig};
pub use export::{ExportBundle, EXPORT_VERSION};
pub use import::{ByteSource, ByteStream, PickedFile, PickerResult};
pub use index::{IndexStore, VaultDecryptedItem, VaultIndex, VaultItemMeta};
pub use items::ItemStore;
pub use keys::MasterKeyManager;
pub use manager::VaultManager;
pub use materialize::{
    BlobRegistry, EphemeralHandle, Handle, MaterializeTarget, Materializer, TempFileHandle,
};
pub use vault::{DecryptedCopy, DocumentVault, DocumentVaultBuilder, RepairReport};
