//! # Sentra KeyVault
//!
//! Device key custody and envelope encryption for Sentra Edge.
//!
//! ## Security Model
//!
//! - One RSA key pair per device, generated once and stored as PKCS#8 PEM
//!   with owner-only file permissions
//! - The private key never leaves [`vault::KeyVault`]; consumers get a
//!   key-unwrap operation, not the key
//! - Every payload is sealed under a fresh random AES-256 key, which is
//!   wrapped with RSA-OAEP (SHA-256) for the recipient
//! - Ciphertexts carry a cipher-suite tag so upgraded suites can coexist
//!   with legacy ones

pub mod crypto;
pub mod error;
pub mod vault;

// Re-exports
pub use crypto::envelope::{seal, open, CipherSuite, SealedAsset};
pub use error::{KeyVaultError, KeyVaultResult};
pub use vault::KeyVault;

/// Sentra KeyVault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
