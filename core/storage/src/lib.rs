//! Persistence abstractions for Lockbox.
//!
//! This module provides:
//! - A key-value store trait for the index and envelope records, with an
//!   in-memory and a local-directory backend
//! - A registry resolving store backends by name and configuration
//! - A secure keystore trait for the master key, with an in-memory and a
//!   platform-keychain backend
//!
//! # Design Principles
//! - Values are opaque bytes: either plaintext metadata or ciphertext
//! - Async operations: All I/O operations are async
//! - Unified error semantics: every rejected read or write is `Error::Storage`

pub mod keystore;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;

pub use keystore::{MemoryKeystore, OsKeystore, SecureKeystore};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use provider::KeyValueStore;
pub use registry::{create_default_registry, StoreFactory, StoreRegistry};
