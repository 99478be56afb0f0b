use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use billsync_core::SyncConfig;
use billsync_sync::freshness::format_age;
use billsync_sync::pipeline::{self, PipelineReport};
use billsync_sync::{PeriodStatus, Recompute, RemoteStore, SyncMode, SyncState};

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// How the daemon is scheduled.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config: SyncConfig,
    /// Time between automatic passes.
    pub interval: Duration,
    /// Upper bound for one pass.
    pub deadline: Duration,
}

impl DaemonOptions {
    /// Options whose deadline equals the tick interval.
    pub fn new(config: SyncConfig, interval: Duration) -> Self {
        Self {
            config,
            interval,
            deadline: interval,
        }
    }
}

struct SyncJob {
    mode: SyncMode,
    source: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub period: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// What a completed pass reports back to whoever triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub source: String,
    pub mode: String,
    pub changed: bool,
    pub periods: Vec<PeriodSummary>,
    pub artifacts: usize,
    pub recomputed: bool,
    pub duration_ms: u128,
}

/// Outcome of the most recent pass, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct PassRecord {
    pub source: String,
    pub mode: String,
    pub finished_at: DateTime<Utc>,
    pub ok: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
struct TrackedPeriod {
    period: String,
    last_modified: Option<DateTime<Utc>>,
    artifact: Option<String>,
}

#[derive(Debug, Default)]
struct DaemonStatus {
    passes: u64,
    failures: u64,
    last_pass: Option<PassRecord>,
    last_success_at: Option<DateTime<Utc>>,
    tracked: Vec<TrackedPeriod>,
}

impl DaemonStatus {
    fn track(&mut self, state: &SyncState) {
        self.tracked = state
            .periods
            .iter()
            .map(|period| TrackedPeriod {
                period: period.to_string(),
                last_modified: state.last_modified(period),
                artifact: state.artifact_name(period).map(str::to_string),
            })
            .collect();
    }
}

type SharedStatus = Arc<RwLock<DaemonStatus>>;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(
    options: DaemonOptions,
    remote: Arc<dyn RemoteStore>,
    hook: Arc<dyn Recompute>,
) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options, remote, hook))
}

/// Run the daemon until `stop`, ctrl-c, or a task failure.
///
/// The first tick runs a full pass; later ticks run automatic passes. Manual
/// `sync` requests share the same queue, so at most one pass is in flight.
pub async fn run(
    options: DaemonOptions,
    remote: Arc<dyn RemoteStore>,
    hook: Arc<dyn Recompute>,
) -> Result<(), DaemonError> {
    let state = SyncState::load(&options.config)?;
    let repository = options.config.repository_path.clone();
    ensure_runtime_dirs(&repository)?;

    let status: SharedStatus = Arc::new(RwLock::new(DaemonStatus::default()));
    status.write().await.track(&state);
    let started_at = Utc::now();

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        repository = %repository.display(),
        bucket = %options.config.bucket,
        report = %options.config.report_name,
        interval_secs = options.interval.as_secs(),
        "daemon starting"
    );

    let ticker_handle = {
        let shutdown = shutdown_tx.clone();
        let sync_tx = sync_tx.clone();
        let interval = options.interval;
        tokio::spawn(async move {
            let result = ticker_task(interval, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let config = options.config.clone();
        let deadline = options.deadline;
        let status = status.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(
                config,
                remote,
                hook,
                deadline,
                state,
                status,
                sync_rx,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let repository = repository.clone();
        let status = status.clone();
        let sync_tx = sync_tx.clone();
        let interval = options.interval;
        tokio::spawn(async move {
            let result = socket_server_task(
                repository,
                status,
                sync_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at,
                interval,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Signal(err)),
                    }
                }
            }
        })
    };

    drop(sync_tx);

    let (ticker_result, processor_result, socket_result, signal_result) =
        tokio::join!(ticker_handle, processor_handle, socket_handle, signal_handle);

    handle_join("ticker", ticker_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn ticker_task(
    interval: Duration,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut mode = SyncMode::Full;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = enqueue_sync(&sync_tx, mode, "interval") => match result {
                Ok(summary) => tracing::info!(
                    mode = %summary.mode,
                    changed = summary.changed,
                    artifacts = summary.artifacts,
                    duration_ms = summary.duration_ms,
                    "scheduled sync completed",
                ),
                Err(DaemonError::ChannelClosed(_)) => break,
                // The processor already logged the failure.
                Err(_) => {}
            },
        }
        mode = SyncMode::Auto;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn sync_processor_task(
    config: SyncConfig,
    remote: Arc<dyn RemoteStore>,
    hook: Arc<dyn Recompute>,
    deadline: Duration,
    mut state: SyncState,
    status: SharedStatus,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let job = tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => match maybe_job {
                Some(job) => job,
                None => break,
            },
        };
        let started = Instant::now();

        let pass = tokio::time::timeout(
            deadline,
            pipeline::run(&config, remote.as_ref(), &mut state, job.mode, hook.as_ref()),
        );
        let result = tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = job.respond_to.send(Err("daemon shutting down".to_string()));
                break;
            }
            result = pass => match result {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(err)) => Err(DaemonError::Sync(err)),
                Err(_) => Err(DaemonError::DeadlineExceeded { after: deadline }),
            },
        };

        let elapsed = started.elapsed();
        let outcome = record_pass(&status, &state, job.mode, job.source, result, elapsed).await;
        let _ = job.respond_to.send(outcome);
    }

    Ok(())
}

async fn record_pass(
    status: &SharedStatus,
    state: &SyncState,
    mode: SyncMode,
    source: &'static str,
    result: Result<PipelineReport, DaemonError>,
    elapsed: Duration,
) -> Result<SyncSummary, String> {
    let finished_at = Utc::now();
    let mut guard = status.write().await;
    guard.passes += 1;
    guard.track(state);

    match result {
        Ok(report) => {
            let summary = build_sync_summary(&report, mode, source, elapsed);
            guard.last_success_at = Some(finished_at);
            guard.last_pass = Some(PassRecord {
                source: source.to_string(),
                mode: summary.mode.clone(),
                finished_at,
                ok: true,
                changed: summary.changed,
                error: None,
                duration_ms: summary.duration_ms,
            });
            Ok(summary)
        }
        Err(err) => {
            let retryable = match &err {
                DaemonError::Sync(sync) => sync.is_retryable(),
                DaemonError::DeadlineExceeded { .. } => true,
                _ => false,
            };
            if retryable {
                tracing::warn!(error = %err, source, "sync pass failed, retrying next tick");
            } else {
                tracing::error!(error = %err, source, "sync pass failed");
            }
            guard.failures += 1;
            guard.last_pass = Some(PassRecord {
                source: source.to_string(),
                mode: mode_label(mode).to_string(),
                finished_at,
                ok: false,
                changed: false,
                error: Some(err.to_string()),
                duration_ms: elapsed.as_millis(),
            });
            Err(err.to_string())
        }
    }
}

async fn socket_server_task(
    repository: PathBuf,
    status: SharedStatus,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at: DateTime<Utc>,
    interval: Duration,
) -> Result<(), DaemonError> {
    let socket = socket_path(&repository);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let repository = repository.clone();
                let status = status.clone();
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        repository,
                        status,
                        sync_tx,
                        shutdown_tx,
                        started_at,
                        interval,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    repository: PathBuf,
    status: SharedStatus,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: DateTime<Utc>,
    interval: Duration,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request {
            DaemonRequest::Status => DaemonResponse::ok(
                build_status_payload(&repository, &status, started_at, interval).await,
            ),
            DaemonRequest::Sync { full } => {
                let mode = if full { SyncMode::Full } else { SyncMode::Auto };
                match enqueue_sync(&sync_tx, mode, "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            DaemonRequest::Stop => DaemonResponse::ok(json!({ "stopping": true })),
        };

        write_response(&mut writer, &response).await?;
        // Answer before shutting down so the caller is not left hanging.
        if request == DaemonRequest::Stop {
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    repository: &Path,
    status: &SharedStatus,
    started_at: DateTime<Utc>,
    interval: Duration,
) -> Value {
    let now = Utc::now();
    let status = status.read().await;
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": started_at,
        "uptime": format_age(started_at, now),
        "interval_secs": interval.as_secs(),
        "passes": status.passes,
        "failures": status.failures,
        "last_pass": status.last_pass,
        "last_success_at": status.last_success_at,
        "periods": status.tracked,
        "socket": socket_path(repository).display().to_string(),
        "repository": repository.display().to_string(),
    })
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    mode: SyncMode,
    source: &'static str,
) -> Result<SyncSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            mode,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::PassFailed)
}

fn build_sync_summary(
    report: &PipelineReport,
    mode: SyncMode,
    source: &'static str,
    duration: Duration,
) -> SyncSummary {
    let periods = report
        .outcome
        .periods
        .iter()
        .map(|outcome| {
            let (status, path) = match &outcome.status {
                PeriodStatus::Unchanged => ("unchanged", None),
                PeriodStatus::Materialized { path } => ("materialized", Some(path)),
                PeriodStatus::AlreadyPresent { path } => ("already_present", Some(path)),
            };
            PeriodSummary {
                period: outcome.period.to_string(),
                status,
                path: path.map(|p| p.display().to_string()),
            }
        })
        .collect();

    SyncSummary {
        source: source.to_string(),
        mode: mode_label(mode).to_string(),
        changed: report.outcome.changed,
        periods,
        artifacts: report.links.len(),
        recomputed: report.recomputed,
        duration_ms: duration.as_millis(),
    }
}

fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Auto => "auto",
        SyncMode::Full => "full",
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::SocketInUse {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(repository: &Path) -> Result<(), DaemonError> {
    let run = run_dir(repository);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
