//! Materialization of decrypted bytes into a transient handle.
//!
//! Two delivery targets exist. `Ephemeral` keeps the bytes in process
//! memory behind a `blob:<uuid>` reference that must be revoked.
//! `Filesystem` writes them to a private scratch directory under a
//! sanitized file name, for viewers that dispatch by extension.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::mime::sanitize_file_name;
use lockbox_common::{Error, Result, SensitiveBytes};

/// Reference scheme of ephemeral handles.
pub const BLOB_SCHEME: &str = "blob:";

/// Where decrypted bytes are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializeTarget {
    /// In-memory reference, released with `revoke()`.
    Ephemeral,
    /// Temp file, released with `cleanup()`.
    Filesystem,
}

struct Blob {
    mime: String,
    bytes: SensitiveBytes,
}

/// Process-wide table of in-memory blobs.
///
/// Clones share the same table.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    blobs: Arc<RwLock<HashMap<String, Blob>>>,
}

fn poisoned() -> Error {
    Error::Storage("Blob registry lock poisoned".to_string())
}

impl BlobRegistry {
    /// Create an empty, private registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static BlobRegistry {
        static GLOBAL: OnceLock<BlobRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BlobRegistry::new)
    }

    fn insert(&self, mime: &str, bytes: SensitiveBytes) -> Result<String> {
        let reference = format!("{}{}", BLOB_SCHEME, Uuid::new_v4());
        let blob = Blob {
            mime: mime.to_string(),
            bytes,
        };
        self.blobs
            .write()
            .map_err(|_| poisoned())?
            .insert(reference.clone(), blob);
        Ok(reference)
    }

    /// Copy out the bytes behind `reference`, `None` once revoked.
    pub fn read(&self, reference: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| poisoned())?
            .get(reference)
            .map(|b| b.bytes.as_bytes().to_vec()))
    }

    /// MIME type recorded for `reference`.
    pub fn mime(&self, reference: &str) -> Result<Option<String>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| poisoned())?
            .get(reference)
            .map(|b| b.mime.clone()))
    }

    /// Drop the bytes behind `reference`.
    ///
    /// # Returns
    /// Whether a live blob was released.
    pub fn revoke(&self, reference: &str) -> bool {
        match self.blobs.write() {
            Ok(mut blobs) => blobs.remove(reference).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(reference).is_some(),
        }
    }

    /// Number of live blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Check if no blob is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory handle to decrypted bytes.
///
/// Dropping the handle revokes it.
pub struct EphemeralHandle {
    reference: String,
    display_name: String,
    mime: String,
    registry: BlobRegistry,
    revoked: bool,
}

impl EphemeralHandle {
    /// The `blob:` reference.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Original file name of the item.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Read the bytes while the handle is live.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        self.registry
            .read(&self.reference)?
            .ok_or_else(|| Error::NotFound(format!("Revoked handle: {}", self.reference)))
    }

    /// Release the bytes. Revoking twice is a no-op.
    pub fn revoke(&mut self) {
        if !self.revoked {
            self.registry.revoke(&self.reference);
            self.revoked = true;
            debug!(reference = %self.reference, "Revoked ephemeral handle");
        }
    }
}

impl Drop for EphemeralHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl std::fmt::Debug for EphemeralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralHandle")
            .field("reference", &self.reference)
            .field("display_name", &self.display_name)
            .field("mime", &self.mime)
            .field("revoked", &self.revoked)
            .finish()
    }
}

/// Temp file holding decrypted bytes.
///
/// The file stays on disk until `cleanup()`; an external viewer may still
/// be reading it after this handle is gone.
#[derive(Debug)]
pub struct TempFileHandle {
    path: PathBuf,
    dir: PathBuf,
    display_name: String,
    mime: String,
}

impl TempFileHandle {
    /// Path of the written file, named with the sanitized name.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original file name of the item.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    /// Remove the file and its private directory.
    pub async fn cleanup(self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed temp file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Transient handle produced by materialize and export.
#[derive(Debug)]
pub enum Handle {
    Ephemeral(EphemeralHandle),
    TempFile(TempFileHandle),
}

impl Handle {
    /// Original file name, for display.
    pub fn display_name(&self) -> &str {
        match self {
            Handle::Ephemeral(h) => h.display_name(),
            Handle::TempFile(h) => h.display_name(),
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Handle::Ephemeral(h) => h.mime(),
            Handle::TempFile(h) => h.mime(),
        }
    }

    /// Blob reference or file path, as text.
    pub fn location(&self) -> String {
        match self {
            Handle::Ephemeral(h) => h.reference().to_string(),
            Handle::TempFile(h) => h.path().display().to_string(),
        }
    }

    /// Read back the delivered bytes.
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Handle::Ephemeral(h) => h.read_bytes(),
            Handle::TempFile(h) => h.read_bytes().await,
        }
    }

    /// Revoke the reference or remove the temp file.
    pub async fn release(self) -> Result<()> {
        match self {
            Handle::Ephemeral(mut h) => {
                h.revoke();
                Ok(())
            }
            Handle::TempFile(h) => h.cleanup().await,
        }
    }
}

/// Produces handles for one configured target.
pub struct Materializer {
    target: MaterializeTarget,
    scratch_dir: PathBuf,
    registry: BlobRegistry,
}

impl Materializer {
    pub fn new(
        target: MaterializeTarget,
        scratch_dir: impl Into<PathBuf>,
        registry: BlobRegistry,
    ) -> Self {
        Self {
            target,
            scratch_dir: scratch_dir.into(),
            registry,
        }
    }

    pub fn target(&self) -> MaterializeTarget {
        self.target
    }

    /// Hand out `bytes` as a handle for the configured target.
    ///
    /// # Postconditions
    /// - The handle reports `name` as display name, never the sanitized one
    /// - A temp file lives in its own fresh subdirectory of the scratch dir
    ///
    /// # Errors
    /// - Scratch directory or file write failure
    pub async fn deliver(
        &self,
        name: &str,
        mime: &str,
        bytes: SensitiveBytes,
    ) -> Result<Handle> {
        match self.target {
            MaterializeTarget::Ephemeral => {
                let reference = self.registry.insert(mime, bytes)?;
                debug!(reference = %reference, mime = %mime, "Created ephemeral handle");
                Ok(Handle::Ephemeral(EphemeralHandle {
                    reference,
                    display_name: name.to_string(),
                    mime: mime.to_string(),
                    registry: self.registry.clone(),
                    revoked: false,
                }))
            }
            MaterializeTarget::Filesystem => {
                let handle = self.write_temp_file(name, mime, bytes.as_bytes()).await?;
                Ok(Handle::TempFile(handle))
            }
        }
    }

    async fn write_temp_file(
        &self,
        name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<TempFileHandle> {
        let dir = self.scratch_dir.join(Uuid::new_v4().to_string());
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&dir).await?;

        let path = dir.join(sanitize_file_name(name, mime));
        if let Err(e) = write_private(&path, bytes).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                warn!(error = %cleanup, "Failed to remove partial temp file");
            }
            return Err(e);
        }

        debug!(path = %path.display(), size = bytes.len(), "Wrote temp file");
        Ok(TempFileHandle {
            path,
            dir,
            display_name: name.to_string(),
            mime: mime.to_string(),
        })
    }
}

async fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}
