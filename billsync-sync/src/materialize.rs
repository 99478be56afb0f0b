//! Report materializer.
//!
//! ## `materialize` protocol
//!
//! 1. Derive the final path from the manifest; if it exists, stop.
//! 2. Create (truncate) `<path>.tmp`. A leftover from a crashed pass is
//!    overwritten, never appended to.
//! 3. For every segment in manifest order, stream, gunzip and append. Every
//!    segment after the first loses its header line.
//! 4. Flush, fsync, rename onto the final path (atomic on POSIX).
//!
//! Each segment runs as a producer task feeding remote chunks into a bounded
//! channel and a consumer decoding them into the temporary file. When the
//! consumer fails, or the pass is dropped mid-segment, the producer is
//! aborted; when the producer fails the consumer reads the error out of the
//! channel.

use std::io;
use std::path::{Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::task::AbortOnDropHandle;

use billsync_core::config::tmp_sibling;
use billsync_core::{ReportManifest, SyncConfig};

use crate::error::{io_err, IntegrityViolation, RemoteError, SyncError, TransferError};
use crate::remote::{ByteStream, RemoteStore};

/// Chunks buffered between one segment's producer and consumer.
pub const SEGMENT_CHANNEL_DEPTH: usize = 8;

/// Outcome of materializing one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeResult {
    /// The artifact was assembled and renamed into place.
    Written { path: PathBuf },
    /// The artifact was already present; nothing was fetched.
    AlreadyExists { path: PathBuf },
}

impl MaterializeResult {
    pub fn path(&self) -> &Path {
        match self {
            MaterializeResult::Written { path } | MaterializeResult::AlreadyExists { path } => path,
        }
    }
}

/// Assemble the artifact described by `manifest` under the data directory.
pub async fn materialize(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    manifest: &ReportManifest,
) -> Result<MaterializeResult, SyncError> {
    let path = config
        .artifact_path(manifest)
        .map_err(|e| SyncError::ManifestIntegrity {
            manifest: manifest.assembly_id.clone(),
            violation: IntegrityViolation::Field(e),
        })?;

    if tokio::fs::try_exists(&path)
        .await
        .map_err(|e| io_err(&path, e))?
    {
        tracing::debug!(path = %path.display(), "artifact already present");
        return Ok(MaterializeResult::AlreadyExists { path });
    }

    let tmp = tmp_sibling(&path);
    if let Err(err) = write_segments(remote, manifest, &tmp).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }

    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(&path, e));
    }

    tracing::info!(
        path = %path.display(),
        parts = manifest.report_keys.len(),
        "materialized report"
    );
    Ok(MaterializeResult::Written { path })
}

async fn write_segments(
    remote: &dyn RemoteStore,
    manifest: &ReportManifest,
    tmp: &Path,
) -> Result<(), SyncError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)
        .await
        .map_err(|e| io_err(tmp, e))?;

    for (index, key) in manifest.report_keys.iter().enumerate() {
        let written = append_segment(remote, key, index > 0, &mut file)
            .await
            .map_err(|source| SyncError::Transfer {
                key: key.clone(),
                path: tmp.to_path_buf(),
                source,
            })?;
        tracing::debug!(key = %key, bytes = written, "appended segment");
    }

    file.flush().await.map_err(|e| io_err(tmp, e))?;
    file.sync_all().await.map_err(|e| io_err(tmp, e))?;
    Ok(())
}

/// Stream one gzip segment into `out`, returning the decompressed byte count.
async fn append_segment(
    remote: &dyn RemoteStore,
    key: &str,
    skip_header: bool,
    out: &mut File,
) -> Result<u64, TransferError> {
    let body = remote.get_stream(key).await.map_err(TransferError::Remote)?;
    let (tx, rx) = mpsc::channel(SEGMENT_CHANNEL_DEPTH);
    let producer = AbortOnDropHandle::new(tokio::spawn(forward_chunks(body, tx)));

    match decode_into(rx, skip_header, out).await {
        Ok(written) => match producer.await {
            Ok(Ok(())) => Ok(written),
            Ok(Err(remote)) => Err(TransferError::Remote(remote)),
            Err(join) => Err(TransferError::Join(join)),
        },
        Err(io) => {
            producer.abort();
            match producer.await {
                Ok(Err(remote)) => Err(TransferError::Remote(remote)),
                _ => Err(TransferError::Io(io)),
            }
        }
    }
}

/// Producer half: forward remote chunks until the body ends, the consumer
/// goes away, or the remote fails.
async fn forward_chunks(
    mut body: ByteStream,
    tx: mpsc::Sender<io::Result<Bytes>>,
) -> Result<(), RemoteError> {
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    return Ok(());
                }
            }
            Err(err) => {
                let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Consumer half: gunzip the channel's bytes into `out`.
async fn decode_into(
    rx: mpsc::Receiver<io::Result<Bytes>>,
    skip_header: bool,
    out: &mut File,
) -> io::Result<u64> {
    let chunks = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .boxed();

    let mut decoder = GzipDecoder::new(StreamReader::new(chunks));
    decoder.multiple_members(true);
    let mut reader = BufReader::new(decoder);

    if skip_header {
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header).await?;
    }
    tokio::io::copy_buf(&mut reader, out).await
}
