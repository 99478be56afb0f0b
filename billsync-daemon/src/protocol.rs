//! Newline-delimited JSON over the daemon's Unix socket.
//!
//! One request per line, one response line per request:
//!
//! ```text
//! {"cmd":"status"}
//! {"cmd":"sync","full":true}
//! {"cmd":"stop"}
//! ```

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

const STATUS_ATTEMPTS: usize = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    Status,
    Sync {
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        full: bool,
    },
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The payload of a successful response; a failed one becomes
    /// [`DaemonError::Protocol`].
    pub fn into_data(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, error) => Err(DaemonError::Protocol(
                error.unwrap_or_else(|| "daemon reported an unspecified error".to_string()),
            )),
        }
    }
}

/// Send one request to the daemon serving `repository` and read its reply.
pub fn send_request(
    repository: &Path,
    request: &DaemonRequest,
) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(repository);
    let stream = match UnixStream::connect(&socket) {
        Ok(stream) => stream,
        Err(err) if daemon_absent(&err) => return Err(DaemonError::DaemonNotRunning { socket }),
        Err(err) => return Err(io_err(&socket, err)),
    };

    let mut writer = &stream;
    serde_json::to_writer(&mut writer, request)?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(&stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon hung up without answering".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

fn daemon_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}

/// Query status. A daemon that is still binding its socket gets a few
/// short retries before it is reported as not running.
pub fn request_status(repository: &Path) -> Result<Value, DaemonError> {
    let mut attempt = 1;
    loop {
        match send_request(repository, &DaemonRequest::Status) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(STATUS_RETRY_DELAY);
            }
            result => return result?.into_data(),
        }
    }
}

pub fn request_stop(repository: &Path) -> Result<(), DaemonError> {
    send_request(repository, &DaemonRequest::Stop)?
        .into_data()
        .map(drop)
}

/// Run a pass through the daemon's queue and wait for its summary.
pub fn request_sync(repository: &Path, full: bool) -> Result<Value, DaemonError> {
    send_request(repository, &DaemonRequest::Sync { full })?.into_data()
}
