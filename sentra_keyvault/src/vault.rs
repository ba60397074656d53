//! Sentra KeyVault - Device Key Custody
//!
//! Owns the device RSA key pair. The private key is loaded once, guarded by
//! a lock, and only ever used through [`KeyVault::unwrap_key`]; no caller
//! sees the key itself.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{KeyVaultError, KeyVaultResult};

/// Private key file name inside the vault directory
const KEY_FILE: &str = "device_key.pem";

/// Default RSA modulus size
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Device key vault
pub struct KeyVault {
    /// Vault directory
    dir: PathBuf,
    /// Private key, serialized access
    private: Mutex<RsaPrivateKey>,
    /// Public half, safe to hand out
    public: RsaPublicKey,
}

impl KeyVault {
    /// Generate a fresh key pair and persist it under `dir`.
    ///
    /// Fails with [`KeyVaultError::VaultExists`] if a key pair is already
    /// present; use [`KeyVault::generate_overwrite`] to replace one
    /// explicitly.
    pub fn generate<P: AsRef<Path>>(dir: P, bits: usize) -> KeyVaultResult<Self> {
        let key_path = dir.as_ref().join(KEY_FILE);
        if key_path.exists() {
            return Err(KeyVaultError::VaultExists(key_path.display().to_string()));
        }
        Self::generate_overwrite(dir, bits)
    }

    /// Generate a fresh key pair, replacing any existing one.
    pub fn generate_overwrite<P: AsRef<Path>>(dir: P, bits: usize) -> KeyVaultResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| KeyVaultError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyVaultError::KeyEncoding(e.to_string()))?;
        write_restricted(&dir.join(KEY_FILE), pem.as_bytes())?;

        log::info!("generated {}-bit device key pair in {}", bits, dir.display());

        Ok(Self {
            dir,
            private: Mutex::new(private),
            public,
        })
    }

    /// Open an existing key pair.
    pub fn open<P: AsRef<Path>>(dir: P) -> KeyVaultResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let key_path = dir.join(KEY_FILE);

        if !key_path.exists() {
            return Err(KeyVaultError::VaultNotFound(key_path.display().to_string()));
        }
        check_restricted(&key_path)?;

        let pem = Zeroizing::new(fs::read_to_string(&key_path)?);
        let private = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| KeyVaultError::KeyEncoding(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        Ok(Self {
            dir,
            private: Mutex::new(private),
            public,
        })
    }

    /// Vault directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialized public key (SubjectPublicKeyInfo PEM), safe to transmit.
    pub fn public_key_pem(&self) -> KeyVaultResult<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyVaultError::KeyEncoding(e.to_string()))
    }

    /// Short fingerprint of the public key (SHA-256 of the SPKI DER).
    pub fn key_id(&self) -> KeyVaultResult<String> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| KeyVaultError::KeyEncoding(e.to_string()))?;
        let digest = Sha256::digest(der.as_bytes());
        Ok(hex::encode(&digest[..8]))
    }

    /// Unwrap an RSA-OAEP(SHA-256) wrapped symmetric key.
    ///
    /// The only private-key operation this vault exposes. Returns the raw
    /// symmetric key, zeroized on drop.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> KeyVaultResult<Zeroizing<Vec<u8>>> {
        let private = self.private.lock();
        private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|e| {
                log::debug!("key unwrap failed: {e}");
                KeyVaultError::Decrypt
            })
    }
}

/// Write a file with owner-only permissions via temp file + rename.
fn write_restricted(path: &Path, data: &[u8]) -> KeyVaultResult<()> {
    let temp_path = path.with_extension("tmp");

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }

    let mut file = opts.open(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Reject private key files readable by group or other.
#[cfg(unix)]
fn check_restricted(path: &Path) -> KeyVaultResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(KeyVaultError::AccessDenied(format!(
            "{} has mode {:o}, expected owner-only access",
            path.display(),
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_restricted(_path: &Path) -> KeyVaultResult<()> {
    Ok(())
}
