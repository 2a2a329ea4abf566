//! Master key with secure memory handling.
//!
//! The key is zeroized on drop to prevent sensitive data from persisting
//! in memory.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::random::{random_array, RandomSource};
use lockbox_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// The single symmetric key protecting every vault item.
///
/// Destroying the stored copy of this key is the vault's erase-everything
/// primitive: every envelope becomes permanently unreadable.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a fresh random key.
    ///
    /// # Errors
    /// - Secure random source unavailable
    pub fn generate(source: &dyn RandomSource) -> Result<Self> {
        Ok(Self {
            key: random_array(source)?,
        })
    }

    /// Encode the key as base64 text, the form kept in the keystore.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key))
    }

    /// Decode a key from its base64 keystore form.
    ///
    /// # Errors
    /// - Not valid base64
    /// - Decoded length is not KEY_LENGTH
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| Error::Crypto(format!("Invalid key encoding: {}", e)))?,
        );

        if decoded.len() != KEY_LENGTH {
            return Err(Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                decoded.len()
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}
