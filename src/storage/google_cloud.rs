//! Google Cloud Storage backend over the JSON API.
//!
//! Service-account credentials are exchanged for an OAuth access token on connect
//! (RS256 JWT bearer grant); the token is refreshed once it is about to expire. A
//! pre-issued access token can be given instead.

use crate::error::ProviderError;
use crate::provider::http::{self, default_timeout};
use crate::provider::{Configure, Lifecycle};
use crate::storage::{ByteStream, ObjectKey, StorageProvider};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::{StreamExt, TryStreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

const NAME: &str = "googleCloud";
const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_base_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Service-account key file contents, or a ready access token. Keys follow Google's
/// key-file format (`client_email`, `private_key`, ...), not the camelCase options.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
    AccessToken {
        access_token: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ServiceAccount { client_email, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .finish_non_exhaustive(),
            Credentials::AccessToken { .. } => f.write_str("AccessToken"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GoogleCloudOptions {
    pub bucket: String,
    pub credentials: Credentials,
    /// Folder prefixed to every object name.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

enum Auth {
    ServiceAccount {
        client_email: String,
        key: EncodingKey,
        token_uri: String,
    },
    Static(String),
}

struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .map_or(true, |at| Instant::now() + REFRESH_MARGIN < at)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct GoogleCloudStorage {
    client: Client,
    bucket: String,
    root: Option<String>,
    base_url: Url,
    auth: Auth,
    token: RwLock<Option<CachedToken>>,
}

impl Configure for GoogleCloudStorage {
    type Options = GoogleCloudOptions;
    const NAME: &'static str = NAME;

    fn configure(options: GoogleCloudOptions) -> Result<Self, ProviderError> {
        let invalid = |message: String| ProviderError::InvalidOptions { provider: NAME, message };
        if options.bucket.trim().is_empty() {
            return Err(invalid("bucket cannot be empty".into()));
        }
        let base_url = Url::parse(&options.base_url).map_err(|e| invalid(format!("baseUrl: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid(format!("baseUrl {} cannot be a base", base_url)));
        }
        let auth = match options.credentials {
            Credentials::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => Auth::ServiceAccount {
                client_email,
                key: EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .map_err(|e| invalid(format!("credentials.private_key: {}", e)))?,
                token_uri,
            },
            Credentials::AccessToken { access_token } if access_token.is_empty() => {
                return Err(invalid("credentials.access_token cannot be empty".into()));
            }
            Credentials::AccessToken { access_token } => Auth::Static(access_token),
        };
        Ok(GoogleCloudStorage {
            client: http::client(NAME, options.timeout_seconds)?,
            bucket: options.bucket,
            root: options.root,
            base_url,
            auth,
            token: RwLock::new(None),
        })
    }
}

impl GoogleCloudStorage {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::failed(NAME, "base url cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_token(&self) -> Result<CachedToken, ProviderError> {
        let (client_email, key, token_uri) = match &self.auth {
            Auth::Static(token) => {
                return Ok(CachedToken {
                    value: token.clone(),
                    expires_at: None,
                })
            }
            Auth::ServiceAccount {
                client_email,
                key,
                token_uri,
            } => (client_email, key, token_uri),
        };
        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: client_email,
            scope: SCOPE,
            aud: token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
            .map_err(|e| ProviderError::connect(NAME, format!("signing assertion: {}", e)))?;
        let response = self
            .client
            .post(token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::connect(NAME, e))?;
        if !response.status().is_success() {
            return Err(ProviderError::connect(NAME, http::api_error(NAME, response).await));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::connect(NAME, format!("invalid token response: {}", e)))?;
        tracing::debug!(client_email = %client_email, "access token obtained");
        Ok(CachedToken {
            value: body.access_token,
            expires_at: body.expires_in.map(|s| Instant::now() + Duration::from_secs(s)),
        })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    /// Public URL of an uploaded object.
    fn public_url(&self, object: &str) -> Result<String, ProviderError> {
        let segments: Vec<&str> = std::iter::once(self.bucket.as_str()).chain(object.split('/')).collect();
        Ok(self.endpoint(&segments)?.to_string())
    }
}

#[async_trait]
impl Lifecycle for GoogleCloudStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn connect(&mut self) -> Result<(), ProviderError> {
        let token = self.fetch_token().await?;
        *self.token.get_mut() = Some(token);
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for GoogleCloudStorage {
    async fn upload(&self, data: Bytes, key: &ObjectKey) -> Result<String, ProviderError> {
        let object = key.path_under(self.root.as_deref());
        let mut url = self.endpoint(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &object);
        tracing::debug!(bucket = %self.bucket, object, "uploading to Google Cloud Storage");

        let token = self.access_token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;
        if !response.status().is_success() {
            return Err(http::api_error(NAME, response).await);
        }
        self.public_url(&object)
    }

    async fn download(&self, key: &ObjectKey) -> Result<ByteStream, ProviderError> {
        let object = key.path_under(self.root.as_deref());
        let mut url = self.endpoint(&["storage", "v1", "b", self.bucket.as_str(), "o", object.as_str()])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;
        match response.status() {
            status if status.is_success() => Ok(response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                .boxed()),
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound {
                provider: NAME,
                key: object,
            }),
            _ => Err(http::api_error(NAME, response).await),
        }
    }
}

impl std::fmt::Debug for GoogleCloudStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCloudStorage")
            .field("bucket", &self.bucket)
            .field("root", &self.root)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
