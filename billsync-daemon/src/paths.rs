use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "billsync.sock";
pub const RUN_DIR: &str = "run";

pub fn run_dir(repository: &Path) -> PathBuf {
    repository.join(RUN_DIR)
}

pub fn socket_path(repository: &Path) -> PathBuf {
    run_dir(repository).join(DAEMON_SOCKET)
}
