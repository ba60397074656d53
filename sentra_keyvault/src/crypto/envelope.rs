//! Envelope encryption for per-item payloads.
//!
//! Every payload is sealed under a fresh random AES-256 key and 128-bit IV,
//! never reused across assets. The body is AES-256-CBC with PKCS#7 padding;
//! the symmetric key is wrapped with RSA-OAEP using SHA-256 for both the
//! hash and the mask generation function. Blob wire layout:
//!
//! ```text
//! [IV 16B][CIPHERTEXT variable]
//! ```
//!
//! with the wrapped key carried separately. Confidentiality only: there is
//! no authentication tag in suite v1. The suite tag exists so an
//! authenticated suite can coexist with legacy ciphertexts.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{KeyVaultError, KeyVaultResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Symmetric key length (AES-256)
const SYM_KEY_LEN: usize = 32;

/// Initialization vector length (AES block size)
pub const IV_LEN: usize = 16;

/// AES block size; ciphertexts are always a positive multiple of this
const BLOCK_LEN: usize = 16;

/// Versioned cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherSuite {
    /// AES-256-CBC body, RSA-OAEP(SHA-256) key wrap. No integrity tag.
    Aes256CbcRsaOaep,
}

impl CipherSuite {
    /// Current suite for newly sealed assets.
    pub const CURRENT: CipherSuite = CipherSuite::Aes256CbcRsaOaep;

    /// Wire identifier.
    pub fn id(self) -> u8 {
        match self {
            CipherSuite::Aes256CbcRsaOaep => 1,
        }
    }

    /// Parse a wire identifier. Unknown suites fail closed.
    pub fn from_id(id: u8) -> KeyVaultResult<Self> {
        match id {
            1 => Ok(CipherSuite::Aes256CbcRsaOaep),
            other => Err(KeyVaultError::UnsupportedSuite(other)),
        }
    }
}

/// One sealed payload. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedAsset {
    /// Cipher suite this asset was sealed with
    pub suite: CipherSuite,
    /// Per-asset initialization vector
    pub iv: [u8; IV_LEN],
    /// Symmetric key wrapped for the recipient
    pub wrapped_key: Vec<u8>,
    /// AES-CBC ciphertext
    pub ciphertext: Vec<u8>,
}

impl SealedAsset {
    /// Serialize to the `iv || ciphertext` blob layout.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        blob.extend_from_slice(&self.iv);
        blob.extend_from_slice(&self.ciphertext);
        blob
    }

    /// Reassemble an asset from a blob and its separately carried wrapped key.
    pub fn from_blob(blob: &[u8], wrapped_key: Vec<u8>, suite: CipherSuite) -> KeyVaultResult<Self> {
        if blob.len() < IV_LEN + BLOCK_LEN {
            return Err(KeyVaultError::MalformedAsset(format!(
                "blob too small: {} bytes",
                blob.len()
            )));
        }
        let ciphertext = &blob[IV_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(KeyVaultError::MalformedAsset(format!(
                "ciphertext length {} is not block-aligned",
                ciphertext.len()
            )));
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&blob[..IV_LEN]);

        Ok(Self {
            suite,
            iv,
            wrapped_key,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Seal a payload for a recipient public key (SubjectPublicKeyInfo PEM).
///
/// Stateless and safe to call from any number of threads. Plaintext of any
/// length round-trips to the exact original bytes.
pub fn seal(plaintext: &[u8], recipient_pem: &str) -> KeyVaultResult<SealedAsset> {
    let recipient = RsaPublicKey::from_public_key_pem(recipient_pem)
        .map_err(|e| KeyVaultError::KeyEncoding(e.to_string()))?;

    let mut rng = rand::thread_rng();

    let mut key = Zeroizing::new([0u8; SYM_KEY_LEN]);
    rng.fill_bytes(&mut *key);
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(&*key, &iv)
        .map_err(|e| KeyVaultError::Encrypt(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let wrapped_key = recipient
        .encrypt(&mut rng, Oaep::new::<Sha256>(), &*key)
        .map_err(|e| KeyVaultError::Encrypt(e.to_string()))?;

    Ok(SealedAsset {
        suite: CipherSuite::CURRENT,
        iv,
        wrapped_key,
        ciphertext,
    })
}

/// Open a sealed asset.
///
/// `unwrap` recovers the symmetric key from `asset.wrapped_key`; back it
/// with [`crate::vault::KeyVault::unwrap_key`]. A failed unwrap, a key of
/// the wrong size, and invalid padding are indistinguishable to the caller:
/// all surface as [`KeyVaultError::Decrypt`]. Causes go to the debug log.
pub fn open<F>(asset: &SealedAsset, unwrap: F) -> KeyVaultResult<Vec<u8>>
where
    F: FnOnce(&[u8]) -> KeyVaultResult<Zeroizing<Vec<u8>>>,
{
    match asset.suite {
        CipherSuite::Aes256CbcRsaOaep => {}
    }

    let key = unwrap(&asset.wrapped_key).map_err(|e| {
        log::debug!("envelope unwrap failed: {e}");
        KeyVaultError::Decrypt
    })?;
    if key.len() != SYM_KEY_LEN {
        log::debug!("envelope unwrap returned {}-byte key", key.len());
        return Err(KeyVaultError::Decrypt);
    }

    let cipher = Aes256CbcDec::new_from_slices(&key, &asset.iv).map_err(|e| {
        log::debug!("envelope cipher init failed: {e}");
        KeyVaultError::Decrypt
    })?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&asset.ciphertext)
        .map_err(|_| {
            log::debug!("envelope padding check failed");
            KeyVaultError::Decrypt
        })
}
