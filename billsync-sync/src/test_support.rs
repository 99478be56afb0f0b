//! Shared fixtures for unit tests: gzip helpers, an in-memory bucket and a
//! call-counting [`RemoteStore`] wrapper.

use std::io::Write;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use billsync_core::{BillingPeriod, SyncConfig};

use crate::error::RemoteError;
use crate::remote::{ByteStream, Conditional, ObjectStoreRemote, RemoteStore};

pub const BUCKET: &str = "billing";
pub const REPORT: &str = "daily";

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn config_in(root: &FsPath) -> SyncConfig {
    let queries = root.join("queries");
    std::fs::create_dir_all(&queries).unwrap();
    let config = SyncConfig {
        bucket: BUCKET.to_string(),
        report_name: REPORT.to_string(),
        report_prefix: None,
        repository_path: root.join("repository"),
        queries_path: queries,
        state_file_path: root.join("state.json"),
    };
    std::fs::create_dir_all(config.data_dir()).unwrap();
    config
}

pub fn manifest_json(period: &str, assembly_id: &str, bucket: &str, keys: &[String]) -> String {
    let (start, end) = period.split_once('-').unwrap();
    serde_json::json!({
        "assemblyId": assembly_id,
        "compression": "GZIP",
        "contentType": "text/csv",
        "billingPeriod": {
            "start": format!("{start}T000000Z"),
            "end": format!("{end}T000000Z"),
        },
        "bucket": bucket,
        "reportKeys": keys,
    })
    .to_string()
}

/// In-memory bucket laid out like a real report delivery.
pub struct Bucket {
    pub store: Arc<InMemory>,
}

impl Bucket {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }

    pub async fn put(&self, key: &str, body: Vec<u8>) {
        self.store
            .put(&Path::from(key), PutPayload::from(body))
            .await
            .unwrap();
    }

    /// Publish a report for `period` whose segments are `parts` (plain text,
    /// gzipped on upload). Returns the segment keys.
    pub async fn publish(&self, period: &str, assembly_id: &str, parts: &[&str]) -> Vec<String> {
        let keys: Vec<String> = (0..parts.len())
            .map(|n| format!("{REPORT}/{period}/{assembly_id}/{REPORT}-{}.csv.gz", n + 1))
            .collect();
        for (key, text) in keys.iter().zip(parts) {
            self.put(key, gzip(text)).await;
        }
        let manifest = manifest_json(period, assembly_id, BUCKET, &keys);
        self.put(
            &format!("{REPORT}/{period}/{REPORT}-Manifest.json"),
            manifest.into_bytes(),
        )
        .await;
        keys
    }

    pub fn remote(&self) -> ObjectStoreRemote {
        ObjectStoreRemote::new(self.store.clone())
    }
}

pub fn period(raw: &str) -> BillingPeriod {
    raw.parse().unwrap()
}

/// Records every call before delegating.
pub struct Counting<R> {
    inner: R,
    pub lists: Mutex<Vec<String>>,
    pub gets: Mutex<Vec<String>>,
    pub streams: Mutex<Vec<String>>,
}

impl<R> Counting<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lists: Mutex::new(Vec::new()),
            gets: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn list_count(&self) -> usize {
        self.lists.lock().unwrap().len()
    }

    pub fn get_keys(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub fn stream_keys(&self) -> Vec<String> {
        self.streams.lock().unwrap().clone()
    }
}

#[async_trait]
impl<R: RemoteStore> RemoteStore for Counting<R> {
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, RemoteError> {
        self.lists.lock().unwrap().push(prefix.to_string());
        self.inner.list_prefixes(prefix).await
    }

    async fn get_if_modified_since(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Conditional, RemoteError> {
        self.gets.lock().unwrap().push(key.to_string());
        self.inner.get_if_modified_since(key, since).await
    }

    async fn get_stream(&self, key: &str) -> Result<ByteStream, RemoteError> {
        self.streams.lock().unwrap().push(key.to_string());
        self.inner.get_stream(key).await
    }
}
