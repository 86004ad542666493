//! Cloudinary upload API backend. Upload only: Cloudinary serves files from its CDN,
//! so reading them back goes through the returned URL rather than this backend.

use crate::error::ProviderError;
use crate::provider::http::{self, default_timeout};
use crate::provider::{Configure, Lifecycle};
use crate::storage::{ObjectKey, StorageProvider};
use async_trait::async_trait;
use axum::body::Bytes;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

const NAME: &str = "cloudinary";

fn default_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CloudinaryOptions {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder prefixed to every public id.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

pub struct Cloudinary {
    client: Client,
    options: CloudinaryOptions,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Hex SHA-256 of the signed parameters (sorted, `&`-joined) followed by the secret.
fn sign(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    Sha256::digest(format!("{}{}", joined, secret).as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl Configure for Cloudinary {
    type Options = CloudinaryOptions;
    const NAME: &'static str = NAME;

    fn configure(options: CloudinaryOptions) -> Result<Self, ProviderError> {
        for (field, value) in [
            ("cloudName", &options.cloud_name),
            ("apiKey", &options.api_key),
            ("apiSecret", &options.api_secret),
        ] {
            if value.trim().is_empty() {
                return Err(ProviderError::InvalidOptions {
                    provider: NAME,
                    message: format!("{} cannot be empty", field),
                });
            }
        }
        Ok(Cloudinary {
            client: http::client(NAME, options.timeout_seconds)?,
            options: CloudinaryOptions {
                base_url: http::trim_base(&options.base_url),
                ..options
            },
        })
    }
}

#[async_trait]
impl Lifecycle for Cloudinary {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[async_trait]
impl StorageProvider for Cloudinary {
    async fn upload(&self, data: Bytes, key: &ObjectKey) -> Result<String, ProviderError> {
        let public_id = key.path_under(self.options.root.as_deref());
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", public_id.as_str()), ("timestamp", timestamp.as_str())],
            &self.options.api_secret,
        );
        let file = format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&data)
        );
        let url = format!("{}/{}/auto/upload", self.options.base_url, self.options.cloud_name);
        tracing::debug!(url, public_id, "uploading to Cloudinary");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("file", file.as_str()),
                ("public_id", public_id.as_str()),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.options.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;
        if !response.status().is_success() {
            return Err(http::api_error(NAME, response).await);
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::failed(NAME, format!("invalid response: {}", e)))?;
        Ok(body.secure_url)
    }
}

impl std::fmt::Debug for Cloudinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloudinary")
            .field("cloud_name", &self.options.cloud_name)
            .field("root", &self.options.root)
            .finish_non_exhaustive()
    }
}
