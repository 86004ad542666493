//! Storage facade over interchangeable file backends.
//!
//! Files are addressed by `(filename, scope)`. The scope is an optional folder path
//! under the backend root; neither part may climb out of it (`..`, absolute paths and
//! backslashes are refused before any backend is called).

mod cloudinary;
mod fs;
mod google_cloud;

pub use cloudinary::{Cloudinary, CloudinaryOptions};
pub use fs::{FsStorage, FsStorageOptions};
pub use google_cloud::{Credentials, GoogleCloudOptions, GoogleCloudStorage};

use crate::error::ProviderError;
use crate::provider::{IntoProvider, Lifecycle, ProviderRegistry, ProviderSlot, ProviderState};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::sync::Arc;

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Validated location of a stored file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    scope: Vec<String>,
    filename: String,
}

impl ObjectKey {
    pub fn new(filename: &str, scope: Option<&str>) -> Result<Self, ProviderError> {
        if filename.is_empty() || filename == "." || filename == ".." || filename.contains(['/', '\\']) {
            return Err(ProviderError::InvalidInput(format!("invalid filename: {:?}", filename)));
        }
        let scope = match scope.filter(|s| !s.is_empty()) {
            None => Vec::new(),
            Some(s) if s.starts_with('/') || s.contains('\\') => {
                return Err(ProviderError::InvalidInput(format!("invalid scope: {:?}", s)));
            }
            Some(s) => {
                let segments: Vec<String> = s.trim_end_matches('/').split('/').map(str::to_string).collect();
                if segments.iter().any(|seg| seg.is_empty() || seg == "." || seg == "..") {
                    return Err(ProviderError::InvalidInput(format!("invalid scope: {:?}", s)));
                }
                segments
            }
        };
        Ok(ObjectKey {
            scope,
            filename: filename.to_string(),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Path segments: scope segments followed by the filename.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.scope.iter().map(String::as_str).chain(std::iter::once(self.filename.as_str()))
    }

    /// `scope/filename`, or `root/scope/filename` when a backend root is set.
    pub fn path_under(&self, root: Option<&str>) -> String {
        let root = root.map(|r| r.trim_matches('/')).filter(|r| !r.is_empty());
        root.into_iter().chain(self.segments()).collect::<Vec<_>>().join("/")
    }
}

#[async_trait]
pub trait StorageProvider: Lifecycle {
    /// Store `data` and return its public URL.
    async fn upload(&self, data: Bytes, key: &ObjectKey) -> Result<String, ProviderError>;

    /// Default: the backend cannot read files back.
    async fn download(&self, _key: &ObjectKey) -> Result<ByteStream, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.name(),
            operation: "download",
        })
    }

    async fn after_upload(&self, file: StoredFile) -> Result<StoredFile, ProviderError> {
        Ok(file)
    }
}

impl<T: StorageProvider + 'static> IntoProvider<dyn StorageProvider> for T {
    fn into_provider(self) -> Box<dyn StorageProvider> {
        Box::new(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub provider: String,
    pub url: String,
    pub filename: String,
}

pub struct Storage {
    slot: ProviderSlot<dyn StorageProvider>,
}

impl Default for Storage {
    fn default() -> Self {
        Storage::new(Arc::new(Storage::default_registry()))
    }
}

impl Storage {
    pub fn new(registry: Arc<ProviderRegistry<dyn StorageProvider>>) -> Self {
        Storage {
            slot: ProviderSlot::new(registry),
        }
    }

    pub fn default_registry() -> ProviderRegistry<dyn StorageProvider> {
        ProviderRegistry::new()
            .register::<FsStorage>("FS")
            .register::<Cloudinary>("CLOUDINARY")
            .register::<GoogleCloudStorage>("GOOGLECLOUD")
    }

    /// Configure and connect the backend `key`, then make it active. The previous
    /// backend stays active when this fails.
    pub async fn use_provider(&mut self, key: &str, options: Value) -> Result<(), ProviderError> {
        self.slot.install(key, options).await.map_err(|e| {
            tracing::error!(provider = key, error = %e, "storage provider not installed");
            e
        })
    }

    pub async fn upload(
        &self,
        data: impl Into<Bytes>,
        filename: &str,
        scope: Option<&str>,
    ) -> Result<StoredFile, ProviderError> {
        let key = ObjectKey::new(filename, scope)?;
        let provider = self.slot.active()?;
        let data = data.into();
        let size = data.len();
        let result = match provider.upload(data, &key).await {
            Ok(url) => {
                let file = StoredFile {
                    provider: provider.name().to_string(),
                    url,
                    filename: filename.to_string(),
                };
                provider.after_upload(file).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(file) => {
                tracing::info!(provider = provider.name(), url = %file.url, size, "file uploaded");
                Ok(file)
            }
            Err(e) => {
                tracing::error!(provider = provider.name(), filename, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    pub async fn download(&self, filename: &str, scope: Option<&str>) -> Result<ByteStream, ProviderError> {
        let key = ObjectKey::new(filename, scope)?;
        let provider = self.slot.active()?;
        provider.download(&key).await.map_err(|e| {
            tracing::error!(provider = provider.name(), filename, error = %e, "download failed");
            e
        })
    }

    pub fn active_provider(&self) -> Option<&str> {
        self.slot.active_key()
    }

    pub fn state(&self) -> ProviderState {
        self.slot.state()
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("slot", &self.slot).finish()
    }
}

/// Drain a download into memory.
pub async fn collect_bytes(stream: ByteStream) -> io::Result<Vec<u8>> {
    stream
        .try_fold(Vec::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await
}
