//! Cryptographic primitives for Lockbox.
//!
//! This module provides:
//! - A fallible secure random source (no weak fallback)
//! - The master key type with automatic zeroization
//! - The versioned per-item envelope using XChaCha20-Poly1305
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Every envelope gets a fresh random nonce
//! - All decryption failures are reported identically

pub mod envelope;
pub mod keys;
pub mod random;

pub use envelope::{decrypt, encrypt, encrypt_with, Envelope, ENVELOPE_VERSION};
pub use keys::{MasterKey, KEY_LENGTH};
pub use random::{OsRandom, RandomSource};
