#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;

use billsync_core::SyncConfig;
use billsync_sync::remote::{ByteStream, Conditional};
use billsync_sync::{ObjectStoreRemote, RemoteError, RemoteStore};

pub const BUCKET: &str = "billing";
pub const REPORT: &str = "daily";

/// A workspace with a bucket mirror directory and a cache layout.
pub struct Fixture {
    pub root: tempfile::TempDir,
    pub config: SyncConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::TempDir::new().expect("tempdir");
        let queries = root.path().join("queries");
        std::fs::create_dir_all(&queries).expect("queries dir");
        std::fs::create_dir_all(root.path().join("bucket")).expect("bucket dir");
        let config = SyncConfig {
            bucket: BUCKET.to_string(),
            report_name: REPORT.to_string(),
            report_prefix: Some("cur".to_string()),
            repository_path: root.path().join("repository"),
            queries_path: queries,
            state_file_path: root.path().join("state.json"),
        };
        Self { root, config }
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.root.path().join("bucket")
    }

    pub fn remote(&self) -> ObjectStoreRemote {
        ObjectStoreRemote::local(&self.bucket_dir()).expect("local store")
    }

    pub fn put(&self, key: &str, body: &[u8]) {
        let path = self.bucket_dir().join(key);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, body).expect("write object");
    }

    /// Publish a gzip report for `period` declaring `bucket` in its manifest.
    pub fn publish_as(&self, bucket: &str, period: &str, assembly_id: &str, parts: &[&str]) {
        let keys: Vec<String> = (0..parts.len())
            .map(|n| format!("cur/{REPORT}/{period}/{assembly_id}/{REPORT}-{}.csv.gz", n + 1))
            .collect();
        for (key, text) in keys.iter().zip(parts) {
            self.put(key, &gzip(text));
        }
        let (start, end) = period.split_once('-').expect("period");
        let manifest = serde_json::json!({
            "assemblyId": assembly_id,
            "account": "123456789012",
            "compression": "GZIP",
            "contentType": "text/csv",
            "billingPeriod": {"start": format!("{start}T000000Z"), "end": format!("{end}T000000Z")},
            "bucket": bucket,
            "reportKeys": keys,
        });
        self.put(
            &format!("cur/{REPORT}/{period}/{REPORT}-Manifest.json"),
            manifest.to_string().as_bytes(),
        );
    }

    pub fn publish(&self, period: &str, assembly_id: &str, parts: &[&str]) {
        self.publish_as(BUCKET, period, assembly_id, parts);
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.config.data_dir().join(name)
    }

    pub fn data_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.config.data_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes()).expect("gzip");
    encoder.finish().expect("gzip finish")
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read artifact")
}

/// Remote wrapper recording which keys each operation touched.
pub struct Recording<R> {
    inner: R,
    pub lists: Mutex<Vec<String>>,
    pub gets: Mutex<Vec<String>>,
    pub streams: Mutex<Vec<String>>,
}

impl<R> Recording<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lists: Mutex::new(Vec::new()),
            gets: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<String> {
        self.streams.lock().unwrap().clone()
    }

    pub fn lists(&self) -> usize {
        self.lists.lock().unwrap().len()
    }
}

#[async_trait]
impl<R: RemoteStore> RemoteStore for Recording<R> {
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
