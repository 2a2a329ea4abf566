//! Versioned per-item envelope using XChaCha20-Poly1305.
//!
//! An envelope is the serialized output of encrypting one item payload:
//! `{v, iv, salt, ct}`, every binary field as standard base64 text.
//! `iv` is the 24-byte nonce, `ct` is ciphertext followed by the 16-byte
//! Poly1305 tag, and `salt` is random but currently unused (reserved for a
//! key-derivation upgrade).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use serde::{Deserialize, Serialize};

use crate::keys::MasterKey;
use crate::random::{random_array, OsRandom, RandomSource};
use lockbox_common::{Error, Result};

/// Envelope format version written by this implementation.
pub const ENVELOPE_VERSION: u32 = 1;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Size of the reserved salt (16 bytes).
pub const SALT_SIZE: usize = 16;

/// Serialized encryption output for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Format version.
    pub v: u32,
    /// Base64 nonce.
    pub iv: String,
    /// Base64 reserved salt.
    pub salt: String,
    /// Base64 ciphertext with appended tag.
    pub ct: String,
}

impl Envelope {
    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from stored bytes.
    ///
    /// A malformed record is reported as a decryption failure, the same as
    /// every other reason an envelope cannot be opened.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|_| Error::decryption_failed())
    }
}

/// Encrypt `plaintext` under `key` with nonces from the platform CSPRNG.
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<Envelope> {
    encrypt_with(&OsRandom, key, plaintext)
}

/// Encrypt `plaintext` under `key`, drawing nonce and salt from `source`.
///
/// # Postconditions
/// - A fresh nonce is drawn on every call; nonces are never reused
/// - The envelope carries `ENVELOPE_VERSION`
///
/// # Errors
/// - Random source unavailable
/// - Encryption failure
pub fn encrypt_with(
    source: &dyn RandomSource,
    key: &MasterKey,
    plaintext: &[u8],
) -> Result<Envelope> {
    let nonce: [u8; NONCE_SIZE] = random_array(source)?;
    let salt: [u8; SALT_SIZE] = random_array(source)?;

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(Envelope {
        v: ENVELOPE_VERSION,
        iv: STANDARD.encode(nonce),
        salt: STANDARD.encode(salt),
        ct: STANDARD.encode(ciphertext),
    })
}

/// Decrypt an envelope under `key`.
///
/// # Errors
/// Unknown version, malformed fields, a wrong key and tampered ciphertext
/// all return the same `Error::Crypto("decryption failed")`.
pub fn decrypt(key: &MasterKey, envelope: &Envelope) -> Result<Vec<u8>> {
    if envelope.v != ENVELOPE_VERSION {
        return Err(Error::decryption_failed());
    }

    let nonce = STANDARD
        .decode(&envelope.iv)
        .map_err(|_| Error::decryption_failed())?;
    if nonce.len() != NONCE_SIZE {
        return Err(Error::decryption_failed());
    }

    let ciphertext = STANDARD
        .decode(&envelope.ct)
        .map_err(|_| Error::decryption_failed())?;
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::decryption_failed());
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| Error::decryption_failed())
}
