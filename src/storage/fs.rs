//! Local filesystem backend. Files live under `dist` and are served from `url`.

use crate::error::ProviderError;
use crate::provider::{Configure, Lifecycle};
use crate::storage::{ByteStream, ObjectKey, StorageProvider};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use url::Url;

const NAME: &str = "fs";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsStorageOptions {
    /// Directory receiving the files.
    pub dist: PathBuf,
    /// Public base URL of `dist`.
    pub url: Url,
}

#[derive(Debug)]
pub struct FsStorage {
    dist: PathBuf,
    base_url: Url,
}

impl FsStorage {
    fn path_of(&self, key: &ObjectKey) -> PathBuf {
        key.segments().fold(self.dist.clone(), |path, segment| path.join(segment))
    }

    fn url_of(&self, key: &ObjectKey) -> Result<String, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::failed(NAME, "base url cannot have a path"))?
            .pop_if_empty()
            .extend(key.segments());
        Ok(url.to_string())
    }
}

impl Configure for FsStorage {
    type Options = FsStorageOptions;
    const NAME: &'static str = NAME;

    fn configure(options: FsStorageOptions) -> Result<Self, ProviderError> {
        if options.dist.as_os_str().is_empty() {
            return Err(ProviderError::InvalidOptions {
                provider: NAME,
                message: "dist cannot be empty".into(),
            });
        }
        if options.url.cannot_be_a_base() {
            return Err(ProviderError::InvalidOptions {
                provider: NAME,
                message: format!("url {} cannot be a base", options.url),
            });
        }
        Ok(FsStorage {
            dist: options.dist,
            base_url: options.url,
        })
    }
}

#[async_trait]
impl Lifecycle for FsStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn connect(&mut self) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.dist)
            .await
            .map_err(|e| ProviderError::connect(NAME, format!("{}: {}", self.dist.display(), e)))
    }
}

#[async_trait]
impl StorageProvider for FsStorage {
    async fn upload(&self, data: Bytes, key: &ObjectKey) -> Result<String, ProviderError> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::failed(NAME, format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ProviderError::failed(NAME, format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "file written");
        self.url_of(key)
    }

    async fn download(&self, key: &ObjectKey) -> Result<ByteStream, ProviderError> {
        let path = self.path_of(key);
        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProviderError::NotFound {
                provider: NAME,
                key: key.path_under(None),
            },
            _ => ProviderError::failed(NAME, format!("{}: {}", path.display(), e)),
        })?;
        Ok(ReaderStream::new(file).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::collect_bytes;
    use serde_json::json;

    async fn connected(dir: &std::path::Path) -> FsStorage {
        let mut storage = FsStorage::from_value(json!({
            "dist": dir.join("uploads"),
            "url": "http://localhost:3000/static"
        }))
        .unwrap();
        storage.connect().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn upload_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let storage = connected(dir.path()).await;
        let key = ObjectKey::new("a b.txt", Some("docs")).unwrap();
        let url = storage.upload(Bytes::from_static(b"hello"), &key).await.unwrap();
        assert_eq!(url, "http://localhost:3000/static/docs/a%20b.txt");
        assert!(dir.path().join("uploads/docs/a b.txt").exists());
        let bytes = collect_bytes(storage.download(&key).await.unwrap()).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = connected(dir.path()).await;
        let key = ObjectKey::new("nope.txt", None).unwrap();
        assert!(matches!(
            storage.download(&key).await,
            Err(ProviderError::NotFound { provider: "fs", .. })
        ));
    }

    #[test]
    fn options_are_closed() {
        assert!(FsStorage::from_value(json!({ "dist": "/tmp/x" })).is_err());
        assert!(FsStorage::from_value(json!({ "dist": "/tmp/x", "url": "http://h/", "mode": 1 })).is_err());
        assert!(FsStorage::from_value(json!({ "dist": "/tmp/x", "url": "mailto:a@b.c" })).is_err());
    }
}
