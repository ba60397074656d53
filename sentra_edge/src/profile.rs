//! Sentra Edge - Remote Profile Model
//!
//! Wire rows as the profile service returns them, plus the validated
//! snapshot the sync engine works from. A profile carries the blob
//! references and the per-asset wrapped keys; the blobs themselves live in
//! object storage.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, EdgeResult};

/// Profiles reference between 1 and this many assets
pub const MAX_ASSETS: usize = 6;

/// Row from the products table (product key -> user lookup)
#[derive(Debug, Deserialize)]
pub struct ProductRow {
    pub user_id: Option<String>,
}

/// Raw profile row as returned by the service
#[derive(Debug, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    /// JSON-encoded array of base64 wrapped keys, one per image url
    #[serde(default)]
    pub images_encrypted_keys: Option<String>,
}

/// One remote asset: where its ciphertext lives and the key that opens it.
#[derive(Debug, Clone)]
pub struct AssetRef {
    /// Stable asset identifier (blob basename)
    pub id: String,
    /// Blob location; may be absolute or relative to the blob base URL
    pub url: String,
    /// RSA-OAEP wrapped symmetric key
    pub wrapped_key: Vec<u8>,
}

/// Validated remote state at one point in time.
#[derive(Debug, Clone)]
pub struct ProfileSnapshot {
    pub user_id: String,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub assets: Vec<AssetRef>,
}

impl ProfileSnapshot {
    /// Validate a raw profile row into a snapshot.
    pub fn from_row(row: ProfileRow) -> EdgeResult<Self> {
        let urls = row.image_urls.unwrap_or_default();
        if urls.is_empty() || urls.len() > MAX_ASSETS {
            return Err(EdgeError::MalformedProfile(format!(
                "expected 1-{} assets, found {}",
                MAX_ASSETS,
                urls.len()
            )));
        }

        let keys_json = row
            .images_encrypted_keys
            .ok_or_else(|| EdgeError::MalformedProfile("missing wrapped keys".into()))?;
        let keys_b64: Vec<String> = serde_json::from_str(&keys_json)
            .map_err(|e| EdgeError::MalformedProfile(format!("wrapped keys not valid JSON: {e}")))?;
        if keys_b64.len() != urls.len() {
            return Err(EdgeError::MalformedProfile(format!(
                "{} assets but {} wrapped keys",
                urls.len(),
                keys_b64.len()
            )));
        }

        let mut assets = Vec::with_capacity(urls.len());
        for (i, (url, key_b64)) in urls.into_iter().zip(keys_b64).enumerate() {
            let wrapped_key = base64::engine::general_purpose::STANDARD
                .decode(key_b64.trim())
                .map_err(|e| {
                    EdgeError::MalformedProfile(format!("wrapped key {i} is not base64: {e}"))
                })?;
            assets.push(AssetRef {
                id: asset_id_from_url(&url, i),
                url,
                wrapped_key,
            });
        }

        Ok(Self {
            user_id: row.id,
            display_name: row.full_name,
            updated_at: row.updated_at,
            assets,
        })
    }

    /// Metadata half of the snapshot, suitable for caching on disk.
    pub fn meta(&self) -> ProfileMeta {
        ProfileMeta {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            updated_at: self.updated_at,
            asset_count: self.assets.len(),
        }
    }
}

/// Locally cached profile metadata (asset list deliberately excluded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub user_id: String,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub asset_count: usize,
}

/// Derive a stable asset id from the blob url.
fn asset_id_from_url(url: &str, index: usize) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("encrypted_{}.bin", index + 1))
}
