//! Remote store seam.
//!
//! The engine needs exactly three operations from the bucket: a delimited
//! listing, a conditional get and a streaming get. [`ObjectStoreRemote`]
//! provides them on top of `object_store` (S3, a local mirror directory, or
//! the in-memory store used by tests).

use std::path::Path as FsPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{GetOptions, ObjectStore};

use crate::error::RemoteError;

/// Raw object bytes as they arrive from the store.
pub type ByteStream = BoxStream<'static, Result<Bytes, RemoteError>>;

/// Outcome of a conditional get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional {
    /// The object has not changed since the given instant.
    NotModified,
    Modified {
        body: Bytes,
        last_modified: DateTime<Utc>,
    },
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Names of the immediate "subdirectories" under `prefix`.
    ///
    /// Pagination is the implementation's concern; callers see every page.
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, RemoteError>;

    /// Fetch `key` only if it changed after `since`; `None` always fetches.
    async fn get_if_modified_since(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Conditional, RemoteError>;

    /// Stream the body of `key` without buffering it.
    async fn get_stream(&self, key: &str) -> Result<ByteStream, RemoteError>;
}

/// [`RemoteStore`] backed by any `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreRemote {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreRemote {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// S3 bucket, with credentials taken from the standard AWS environment.
    pub fn s3(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<Self, RemoteError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region);
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let store = builder.build().map_err(RemoteError::Config)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// A directory holding a mirror of the bucket's contents.
    pub fn local(root: &FsPath) -> Result<Self, RemoteError> {
        let store = LocalFileSystem::new_with_prefix(root).map_err(RemoteError::Config)?;
        Ok(Self::new(Arc::new(store)))
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, RemoteError> {
        let location = Path::from(prefix);
        let listing = self
            .store
            .list_with_delimiter(Some(&location))
            .await
            .map_err(|source| RemoteError::List {
                prefix: prefix.to_string(),
                source,
            })?;
        Ok(listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect())
    }

    async fn get_if_modified_since(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Conditional, RemoteError> {
        let location = Path::from(key);
        let options = GetOptions {
            if_modified_since: since,
            ..GetOptions::default()
        };
        let get_err = |source: object_store::Error| RemoteError::Get {
            key: key.to_string(),
            source,
        };
        match self.store.get_opts(&location, options).await {
            Ok(result) => {
                let last_modified = result.meta.last_modified;
                let body = result.bytes().await.map_err(get_err)?;
                Ok(Conditional::Modified {
                    body,
                    last_modified,
                })
            }
            Err(object_store::Error::NotModified { .. }) => Ok(Conditional::NotModified),
            Err(source) => Err(get_err(source)),
        }
    }

    async fn get_stream(&self, key: &str) -> Result<ByteStream, RemoteError> {
        let location = Path::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|source| RemoteError::Get {
                key: key.to_string(),
                source,
            })?;
        let key = key.to_string();
        Ok(result
            .into_stream()
            .map_err(move |source| RemoteError::Get {
                key: key.clone(),
                source,
            })
            .boxed())
    }
}
