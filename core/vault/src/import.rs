//! Import pipeline.
//!
//! A picked file can arrive as resident bytes, as base64 text, as a path
//! to read, or as a stream of chunks. Every shape is resolved to base64
//! text before it is sealed into an envelope.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::index::{VaultDecryptedItem, VaultItemMeta};
use crate::mime::resolve_mime;
use crate::vault::DocumentVault;
use lockbox_common::{Error, ItemId, Result};

/// Name given to picks that arrive without one.
const UNNAMED: &str = "document";

/// Chunked byte source, such as a native file-like object.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Where the bytes of a picked file come from.
pub enum ByteSource {
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// Bytes already encoded as standard base64.
    Base64(String),
    /// A file that still has to be read.
    Path(PathBuf),
    /// A stream of chunks.
    Stream(ByteStream),
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ByteSource::Base64(s) => write!(f, "Base64({} chars)", s.len()),
            ByteSource::Path(p) => write!(f, "Path({})", p.display()),
            ByteSource::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// A file chosen by the user.
#[derive(Debug)]
pub struct PickedFile {
    pub name: String,
    /// Declared MIME type; inferred from `name` when absent.
    pub mime: Option<String>,
    /// Declared size; measured when absent.
    pub size: Option<u64>,
    pub source: ByteSource,
}

impl PickedFile {
    pub fn new(name: impl Into<String>, source: ByteSource) -> Self {
        Self {
            name: name.into(),
            mime: None,
            size: None,
            source,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Result of a file pick.
#[derive(Debug)]
pub enum PickerResult {
    /// The user dismissed the picker, or picked nothing.
    Cancelled,
    Picked(PickedFile),
}

/// Canonical base64 content plus the decoded length.
struct Resolved {
    content: Zeroizing<String>,
    measured: u64,
}

impl Resolved {
    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            content: Zeroizing::new(STANDARD.encode(bytes)),
            measured: bytes.len() as u64,
        }
    }
}

fn unreadable(e: Error) -> Error {
    match e {
        Error::UnreadableSource(_) | Error::Cancelled => e,
        other => Error::UnreadableSource(other.to_string()),
    }
}

async fn resolve_source(source: ByteSource, cancel: &CancellationToken) -> Result<Resolved> {
    match source {
        ByteSource::Bytes(bytes) => {
            let bytes = Zeroizing::new(bytes);
            Ok(Resolved::from_bytes(&bytes))
        }
        // Line-wrapped input is accepted; anything else that fails to
        // decode is rejected before a key or record is touched.
        ByteSource::Base64(text) => {
            let text = Zeroizing::new(text);
            let compact: Zeroizing<String> = Zeroizing::new(
                text.chars().filter(|c| !c.is_ascii_whitespace()).collect(),
            );
            let bytes = Zeroizing::new(
                STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| Error::UnreadableSource(format!("Invalid base64: {}", e)))?,
            );
            Ok(Resolved::from_bytes(&bytes))
        }
        ByteSource::Path(path) => {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                read = tokio::fs::read(&path) => read,
            };
            let bytes = Zeroizing::new(read.map_err(|e| {
                Error::UnreadableSource(format!("{}: {}", path.display(), e))
            })?);
            Ok(Resolved::from_bytes(&bytes))
        }
        ByteSource::Stream(mut stream) => {
            let mut bytes = Zeroizing::new(Vec::new());
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    next = stream.next() => next,
                };
                match next {
                    Some(chunk) => {
                        let chunk = Zeroizing::new(chunk.map_err(unreadable)?);
                        bytes.extend_from_slice(&chunk);
                    }
                    None => break,
                }
            }
            Ok(Resolved::from_bytes(&bytes))
        }
    }
}

impl DocumentVault {
    /// Import the result of a file pick.
    ///
    /// # Returns
    /// `None` when the pick was cancelled; that is not an error.
    pub async fn import_from_picker(
        &self,
        result: PickerResult,
    ) -> Result<Option<VaultItemMeta>> {
        match result {
            PickerResult::Cancelled => {
                debug!("Pick cancelled, nothing imported");
                Ok(None)
            }
            PickerResult::Picked(file) => self
                .import_picked(file, &CancellationToken::new())
                .await
                .map(Some),
        }
    }

    /// Import one document from any byte source.
    pub async fn import_from_source(
        &self,
        name: &str,
        mime: Option<&str>,
        size: Option<u64>,
        source: ByteSource,
    ) -> Result<VaultItemMeta> {
        self.import_from_source_with(name, mime, size, source, &CancellationToken::new())
            .await
    }

    /// Import one document, giving up with `Cancelled` once `cancel` fires.
    ///
    /// # Postconditions
    /// - The envelope is written before the index entry
    /// - A cancelled import writes nothing
    ///
    /// # Errors
    /// - `UnreadableSource` if the bytes cannot be read
    /// - `Cancelled`
    /// - Encryption or storage failure; nothing is rolled back
    pub async fn import_from_source_with(
        &self,
        name: &str,
        mime: Option<&str>,
        size: Option<u64>,
        source: ByteSource,
        cancel: &CancellationToken,
    ) -> Result<VaultItemMeta> {
        let file = PickedFile {
            name: name.to_string(),
            mime: mime.map(str::to_string),
            size,
            source,
        };
        self.import_picked(file, cancel).await
    }

    async fn import_picked(
        &self,
        file: PickedFile,
        cancel: &CancellationToken,
    ) -> Result<VaultItemMeta> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let name = if file.name.trim().is_empty() {
            UNNAMED.to_string()
        } else {
            file.name
        };
        debug!(name = %name, source = ?file.source, "Importing document");

        let resolved = resolve_source(file.source, cancel).await?;
        let mime = resolve_mime(&name, file.mime.as_deref());
        let size = file.size.unwrap_or(resolved.measured);

        let key = self.ensure_master_key().await?;

        let meta = VaultItemMeta {
            id: ItemId::generate(),
            name,
            mime,
            size,
            created_at: Utc::now(),
        };
        let item = VaultDecryptedItem {
            meta: meta.clone(),
            content_base64: resolved.content.as_str().to_string(),
        };
        let envelope = self.seal(&key, &item)?;
        drop(item);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        {
            let _gate = self.commit_gate.read().await;
            self.items.put(&meta.id, &envelope).await?;
            self.index.upsert(meta.clone()).await?;
        }

        info!(id = %meta.id, mime = %meta.mime, size = meta.size, "Document imported");
        Ok(meta)
    }
}
