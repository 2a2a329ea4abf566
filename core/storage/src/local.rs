//! Local directory key-value store.

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::provider::KeyValueStore;
use lockbox_common::{Error, Result};

/// Characters escaped when turning a key into a file name.
const KEY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Suffix of every record file.
const RECORD_SUFFIX: &str = ".rec";

/// Prefix of in-flight temporary files.
const TEMP_PREFIX: &str = ".tmp-";

/// Local directory key-value store.
///
/// Stores one file per key under the root directory. Writes go to a
/// temporary file first and are renamed into place, so a record is
/// either the old value or the new one, never a torn write.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a new local store with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(storage_err)?;
        }

        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a key to its record path.
    fn record_path(&self, key: &str) -> PathBuf {
        let encoded = utf8_percent_encode(key, KEY_ESCAPE).to_string();
        self.root.join(format!("{}{}", encoded, RECORD_SUFFIX))
    }

    /// Recover the key from a record file name.
    fn key_from_file_name(name: &str) -> Option<String> {
        if name.starts_with(TEMP_PREFIX) {
            return None;
        }
        let encoded = name.strip_suffix(RECORD_SUFFIX)?;
        percent_decode_str(encoded)
            .decode_utf8()
            .ok()
            .map(|k| k.into_owned())
    }
}

fn storage_err(e: std::io::Error) -> Error {
    Error::Storage(e.to_string())
}

#[async_trait]
impl KeyValueStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.record_path(key);
        let temp = self
            .root
            .join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));

        fs::write(&temp, &value).await.map_err(storage_err)?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(storage_err(e));
        }

        debug!(key, size = value.len(), "Record written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.root).await.map_err(storage_err)?;

        while let Some(entry) = entries.next_entry().await.map_err(storage_err)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(key) = Self::key_from_file_name(name) {
                if key.starts_with(prefix) {
                    results.push(key);
                }
            }
        }

        Ok(results)
    }
}
