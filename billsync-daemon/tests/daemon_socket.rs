use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde_json::Value;
use tempfile::TempDir;

use billsync_core::SyncConfig;
use billsync_daemon::{request_status, request_stop, request_sync, run, DaemonError, DaemonOptions};
use billsync_sync::{LogArtifacts, ObjectStoreRemote};

const PERIOD: &str = "20240201-20240301";

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

async fn published_store() -> Arc<InMemory> {
    let store = Arc::new(InMemory::new());
    let part = format!("daily/{PERIOD}/a3/daily-1.csv.gz");
    let manifest = serde_json::json!({
        "assemblyId": "a3",
        "compression": "GZIP",
        "contentType": "text/csv",
        "billingPeriod": {"start": "20240201T000000Z", "end": "20240301T000000Z"},
        "bucket": "billing",
        "reportKeys": [part.clone()],
    });
    store
        .put(&ObjectPath::from(part), PutPayload::from(gzip("id,cost\n1,0.10\n")))
        .await
        .unwrap();
    store
        .put(
            &ObjectPath::from(format!("daily/{PERIOD}/daily-Manifest.json")),
            PutPayload::from(manifest.to_string().into_bytes()),
        )
        .await
        .unwrap();
    store
}

fn config_in(root: &Path) -> SyncConfig {
    let queries = root.join("queries");
    std::fs::create_dir_all(&queries).unwrap();
    SyncConfig {
        bucket: "billing".to_string(),
        report_name: "daily".to_string(),
        report_prefix: None,
        repository_path: root.join("repository"),
        queries_path: queries,
        state_file_path: root.join("state.json"),
    }
}

/// Poll the daemon until its first scheduled pass has been recorded.
async fn wait_for_first_pass(repository: PathBuf) -> Value {
    for _ in 0..100 {
        let repo = repository.clone();
        let status = tokio::task::spawn_blocking(move || request_status(&repo))
            .await
            .unwrap();
        if let Ok(status) = status {
            if status["passes"].as_u64().unwrap_or(0) >= 1 {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("daemon never completed its first pass");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_syncs_on_start_and_answers_socket_requests() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    let repository = config.repository_path.clone();
    let remote = Arc::new(ObjectStoreRemote::new(published_store().await));

    let options = DaemonOptions::new(config.clone(), Duration::from_secs(3600));
    let daemon = tokio::spawn(run(options, remote, Arc::new(LogArtifacts)));

    let status = wait_for_first_pass(repository.clone()).await;
    assert_eq!(status["running"], true);
    assert_eq!(status["failures"], 0);
    assert_eq!(status["last_pass"]["mode"], "full");
    assert_eq!(status["last_pass"]["ok"], true);
    assert_eq!(status["periods"][0]["period"], PERIOD);
    assert_eq!(status["periods"][0]["artifact"], "20240201-a3.csv");
    assert_eq!(
        std::fs::read_to_string(config.data_dir().join("20240201-a3.csv")).unwrap(),
        "id,cost\n1,0.10\n"
    );
    assert!(repository.join("report-current.csv").exists());

    let repo = repository.clone();
    let summary = tokio::task::spawn_blocking(move || request_sync(&repo, false))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary["mode"], "auto");
    assert_eq!(summary["changed"], false);
    assert_eq!(summary["periods"][0]["status"], "unchanged");

    let repo = repository.clone();
    tokio::task::spawn_blocking(move || request_stop(&repo))
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!repository.join("run/billsync.sock").exists());
    let err = request_status(&repository).unwrap_err();
    assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
}
