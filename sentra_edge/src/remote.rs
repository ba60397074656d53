//! Sentra Edge - Remote Profile/Blob Service
//!
//! Narrow seam to the central store. The trait is what the sync engine
//! programs against; the HTTP implementation talks to the REST backend
//! (row-filter queries, apikey + bearer auth). Retry policy belongs to the
//! caller, not this client - each method is a single attempt with a
//! request timeout.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use secrecy::{ExposeSecret, Secret};
use serde_json::json;

use crate::config::EdgeConfig;
use crate::error::{EdgeError, EdgeResult};
use crate::profile::{ProductRow, ProfileRow, ProfileSnapshot};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote profile/blob service contract.
pub trait RemoteStore {
    /// Resolve a product key to the current profile snapshot.
    fn fetch_profile(
        &self,
        product_key: &str,
    ) -> impl Future<Output = EdgeResult<ProfileSnapshot>> + Send;

    /// Download one encrypted blob.
    fn fetch_blob(&self, url: &str) -> impl Future<Output = EdgeResult<Vec<u8>>> + Send;

    /// Publish this device's public key for the product key (provisioning).
    fn publish_public_key(
        &self,
        product_key: &str,
        public_key_pem: &str,
    ) -> impl Future<Output = EdgeResult<()>> + Send;
}

/// REST implementation of [`RemoteStore`].
pub struct HttpRemoteStore {
    client: reqwest::Client,
    service_url: String,
    service_key: Secret<String>,
    blob_url: String,
}

impl HttpRemoteStore {
    pub fn new(config: &EdgeConfig) -> EdgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            service_url: config.service_url.clone(),
            service_key: Secret::new(config.service_key.expose_secret().clone()),
            blob_url: config.blob_url.clone(),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.service_key.expose_secret();
        req.header("apikey", key.as_str()).bearer_auth(key)
    }

    /// Resolve a bare blob name against the blob base URL.
    fn blob_location(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.blob_url, url.trim_start_matches('/'))
        }
    }

    async fn user_id_for_product(&self, product_key: &str) -> EdgeResult<String> {
        let url = format!("{}/rest/v1/products", self.service_url);
        let response = self
            .authed(self.client.get(&url))
            .query(&[
                ("product_key", format!("eq.{product_key}")),
                ("select", "user_id".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EdgeError::Network(format!(
                "product lookup returned {}",
                response.status()
            )));
        }

        let rows: Vec<ProductRow> = response.json().await?;
        rows.into_iter()
            .next()
            .and_then(|row| row.user_id)
            .ok_or_else(|| EdgeError::ProfileNotFound(product_key.to_string()))
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn fetch_profile(&self, product_key: &str) -> EdgeResult<ProfileSnapshot> {
        let user_id = self.user_id_for_product(product_key).await?;

        let url = format!("{}/rest/v1/user_profiles", self.service_url);
        let response = self
            .authed(self.client.get(&url))
            .query(&[("id", format!("eq.{user_id}")), ("select", "*".to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EdgeError::Network(format!(
                "profile fetch returned {}",
                response.status()
            )));
        }

        let rows: Vec<ProfileRow> = response.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| EdgeError::ProfileNotFound(product_key.to_string()))?;

        ProfileSnapshot::from_row(row)
    }

    async fn fetch_blob(&self, url: &str) -> EdgeResult<Vec<u8>> {
        let location = self.blob_location(url);
        let response = self.client.get(&location).send().await?;

        if !response.status().is_success() {
            return Err(EdgeError::Network(format!(
                "blob fetch {} returned {}",
                location,
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn publish_public_key(&self, product_key: &str, public_key_pem: &str) -> EdgeResult<()> {
        // Verify the product key exists before patching; PATCH on a missing
        // row succeeds with zero rows affected.
        self.user_id_for_product(product_key).await?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(public_key_pem);
        let url = format!("{}/rest/v1/products", self.service_url);
        let response = self
            .authed(self.client.patch(&url))
            .header("Prefer", "return=minimal")
            .query(&[("product_key", format!("eq.{product_key}"))])
            .json(&json!({ "public_key": encoded }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EdgeError::Network(format!(
                "public key publish returned {}",
                response.status()
            )));
        }

        log::info!("published public key for product {product_key}");
        Ok(())
    }
}
