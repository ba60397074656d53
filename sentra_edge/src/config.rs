//! Sentra Edge - Runtime Configuration
//!
//! All values come from the environment at startup. A missing required
//! variable is a fatal configuration error; nothing in the core retries or
//! defaults around absent credentials.

use std::env;
use std::path::PathBuf;

use secrecy::Secret;

use crate::error::{EdgeError, EdgeResult};

/// Default acceptance threshold for the matcher
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Edge runtime configuration
pub struct EdgeConfig {
    /// Remote profile service base URL
    pub service_url: String,
    /// Remote service credential (API key)
    pub service_key: Secret<String>,
    /// Blob storage base URL
    pub blob_url: String,
    /// Product key binding this device to a remote profile
    pub product_key: String,
    /// Local data directory (key vault, store, cache)
    pub data_dir: PathBuf,
    /// Matcher acceptance threshold
    pub match_threshold: f32,
}

impl EdgeConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> EdgeResult<Self> {
        let service_url = required("SENTRA_SERVICE_URL")?;
        let service_key = Secret::new(required("SENTRA_SERVICE_KEY")?);
        let blob_url = required("SENTRA_BLOB_URL")?;
        let product_key = required("SENTRA_PRODUCT_KEY")?;

        let data_dir = env::var("SENTRA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./sentra_data"));

        let match_threshold = match env::var("SENTRA_MATCH_THRESHOLD") {
            Ok(raw) => raw.parse::<f32>().map_err(|_| {
                EdgeError::Config(format!("SENTRA_MATCH_THRESHOLD is not a number: {raw}"))
            })?,
            Err(_) => DEFAULT_MATCH_THRESHOLD,
        };
        if !(-1.0..=1.0).contains(&match_threshold) {
            return Err(EdgeError::Config(format!(
                "SENTRA_MATCH_THRESHOLD must be within [-1, 1], got {match_threshold}"
            )));
        }

        Ok(Self {
            service_url: service_url.trim_end_matches('/').to_string(),
            service_key,
            blob_url: blob_url.trim_end_matches('/').to_string(),
            product_key,
            data_dir,
            match_threshold,
        })
    }

    /// Key vault directory.
    pub fn vault_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    /// Embedding store database path.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    /// Decrypted image cache root.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Cached profile metadata file.
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("profile.json")
    }

    /// Recognition log file.
    pub fn scan_log_path(&self) -> PathBuf {
        self.data_dir.join("scan_log.json")
    }
}

fn required(name: &str) -> EdgeResult<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(EdgeError::Config(format!(
            "missing required environment variable {name}"
        ))),
    }
}
