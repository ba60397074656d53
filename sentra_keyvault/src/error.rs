//! Sentra KeyVault - Error Types

use thiserror::Error;

/// Result type for keyvault operations
pub type KeyVaultResult<T> = Result<T, KeyVaultError>;

/// Keyvault error types
#[derive(Error, Debug)]
pub enum KeyVaultError {
    #[error("Key pair already exists at: {0}")]
    VaultExists(String),

    #[error("Key pair not found at: {0}")]
    VaultNotFound(String),

    #[error("Private key access denied: {0}")]
    AccessDenied(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key encoding: {0}")]
    KeyEncoding(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// Deliberately cause-free: wrong key, bad padding and a failed key
    /// unwrap must be indistinguishable to callers.
    #[error("Decryption failed")]
    Decrypt,

    #[error("Unsupported cipher suite: {0}")]
    UnsupportedSuite(u8),

    #[error("Malformed sealed asset: {0}")]
    MalformedAsset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeyVaultError {
    /// True for errors that indicate the device key material is unusable
    /// rather than a single payload being bad.
    pub fn is_vault_fault(&self) -> bool {
        matches!(
            self,
            KeyVaultError::VaultNotFound(_)
                | KeyVaultError::AccessDenied(_)
                | KeyVaultError::KeyEncoding(_)
        )
    }
}
