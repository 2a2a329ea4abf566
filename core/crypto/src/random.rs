//! Secure random source.
//!
//! Key and nonce generation draw from the platform CSPRNG. If the platform
//! source fails, generation fails: there is no fallback to a weaker generator.

use rand::rngs::OsRng;
use rand::RngCore;

use lockbox_common::{Error, Result};

/// Source of uniformly random bytes for keys, nonces and salts.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` with random bytes.
    ///
    /// # Errors
    /// - Returns `Error::Crypto` if no secure source is available
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// Platform CSPRNG (`getrandom` under the hood).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::Crypto(format!("Secure random source unavailable: {}", e)))
    }
}

/// Draw a fixed-size array of random bytes.
pub fn random_array<const N: usize>(source: &dyn RandomSource) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    source.fill(&mut out)?;
    Ok(out)
}
