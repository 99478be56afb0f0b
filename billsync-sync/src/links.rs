//! Reference links over the artifact directory.
//!
//! The query engine reads fixed names (`report-current.csv`, `report-1.csv`,
//! ...) under the repository root. Each is a relative symlink into `data/`,
//! most recent artifact first, replaced atomically through `<link>.tmp`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use billsync_core::config::{is_ready_artifact, tmp_sibling, DATA_DIR};
use billsync_core::SyncConfig;

use crate::error::{io_err, SyncError};
use crate::state::SyncState;

pub const CURRENT_LINK: &str = "report-current.csv";

/// Link name for the artifact at `rank` (0 is the most recent).
pub fn link_name(rank: usize) -> String {
    if rank == 0 {
        CURRENT_LINK.to_string()
    } else {
        format!("report-{rank}.csv")
    }
}

/// Repoint every reference link at the ready artifacts and drop links left
/// over from a larger artifact set. Returns the links in rank order.
///
/// Artifacts recorded in `state` rank first, most recent period first.
/// Ready files the state does not know about follow, newest name first.
pub fn refresh(config: &SyncConfig, state: &SyncState) -> Result<Vec<PathBuf>, SyncError> {
    let data_dir = config.data_dir();
    let names = rank_artifacts(state, ready_artifacts(&data_dir)?);

    let mut links = Vec::with_capacity(names.len());
    for (rank, name) in names.iter().enumerate() {
        let link = config.repository_path.join(link_name(rank));
        let target = Path::new(DATA_DIR).join(name);
        replace_link(&link, &target)?;
        links.push(link);
    }

    remove_stale_links(&config.repository_path, names.len())?;
    tracing::debug!(links = links.len(), "refreshed reference links");
    Ok(links)
}

fn rank_artifacts(state: &SyncState, mut ready: Vec<String>) -> Vec<String> {
    let mut ranked = Vec::with_capacity(ready.len());
    for name in state.report_artifacts.values().rev() {
        if let Some(pos) = ready.iter().position(|n| n == name) {
            ranked.push(ready.swap_remove(pos));
        }
    }
    ready.sort_by(|a, b| b.cmp(a));
    ranked.extend(ready);
    ranked
}

fn ready_artifacts(data_dir: &Path) -> Result<Vec<String>, SyncError> {
    let entries = std::fs::read_dir(data_dir).map_err(|e| io_err(data_dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(data_dir, e))?;
        let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ready_artifact(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

fn replace_link(link: &Path, target: &Path) -> Result<(), SyncError> {
    let tmp = tmp_sibling(link);
    match std::fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(&tmp, e)),
    }
    create_link(target, &tmp)?;
    if let Err(e) = std::fs::rename(&tmp, link) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(link, e));
    }
    Ok(())
}

/// Remove `report-<n>.csv` for every `n >= keep`, and the current link when
/// nothing is left to point at.
fn remove_stale_links(repository: &Path, keep: usize) -> Result<(), SyncError> {
    let entries = std::fs::read_dir(repository).map_err(|e| io_err(repository, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(repository, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(rank) = link_rank(&name) else {
            continue;
        };
        if rank >= keep {
            let path = entry.path();
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}

fn link_rank(name: &str) -> Option<usize> {
    if name == CURRENT_LINK {
        return Some(0);
    }
    let n = name.strip_prefix("report-")?.strip_suffix(".csv")?;
    n.parse::<usize>().ok().filter(|n| *n > 0)
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<(), SyncError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| io_err(link, e))
}

#[cfg(not(unix))]
fn create_link(target: &Path, link: &Path) -> Result<(), SyncError> {
    // No portable relative symlinks; copy the artifact instead.
    let source = link
        .parent()
        .map(|dir| dir.join(target))
        .unwrap_or_else(|| target.to_path_buf());
    std::fs::copy(&source, link)
        .map(|_| ())
        .map_err(|e| io_err(link, e))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{config_in, period};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn touch(config: &SyncConfig, name: &str) {
        std::fs::write(config.data_dir().join(name), name).unwrap();
    }

    fn target_of(config: &SyncConfig, link: &str) -> PathBuf {
        std::fs::read_link(config.repository_path.join(link)).unwrap()
    }

    #[test]
    fn links_follow_descending_artifact_names() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        touch(&config, "20231201-a1.csv");
        touch(&config, "20240201-a3.csv");
        touch(&config, "20240101-a2.csv");
        touch(&config, "20240301-a4.csv.tmp");

        let links = refresh(&config, &SyncState::default()).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(
            target_of(&config, "report-current.csv"),
            PathBuf::from("data/20240201-a3.csv")
        );
        assert_eq!(
            target_of(&config, "report-1.csv"),
            PathBuf::from("data/20240101-a2.csv")
        );
        assert_eq!(
            target_of(&config, "report-2.csv"),
            PathBuf::from("data/20231201-a1.csv")
        );
        // Links resolve to the artifact contents.
        assert_eq!(
            std::fs::read_to_string(config.repository_path.join("report-current.csv")).unwrap(),
            "20240201-a3.csv"
        );
        assert!(!config.repository_path.join("report-current.csv.tmp").exists());
    }

    #[test]
    fn shrinking_artifact_set_drops_surplus_links() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        touch(&config, "20240101-a2.csv");
        touch(&config, "20240201-a3.csv");
        refresh(&config, &SyncState::default()).unwrap();

        std::fs::remove_file(config.data_dir().join("20240101-a2.csv")).unwrap();
        refresh(&config, &SyncState::default()).unwrap();

        assert!(config.repository_path.join("report-current.csv").exists());
        assert!(std::fs::symlink_metadata(config.repository_path.join("report-1.csv")).is_err());
    }

    #[test]
    fn stale_tmp_link_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        touch(&config, "20240101-a2.csv");
        std::os::unix::fs::symlink(
            "data/gone.csv",
            config.repository_path.join("report-current.csv.tmp"),
        )
        .unwrap();

        refresh(&config, &SyncState::default()).unwrap();
        assert_eq!(
            target_of(&config, "report-current.csv"),
            PathBuf::from("data/20240101-a2.csv")
        );
    }

    #[test]
    fn recorded_artifact_outranks_stray_file_for_same_period() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        // An older assembly of the same period sorts after the recorded one.
        touch(&config, "20240201-b7.csv");
        touch(&config, "20240201-a9.csv");
        touch(&config, "20240101-z1.csv");

        let fetched = Utc.with_ymd_and_hms(2024, 2, 14, 0, 0, 0).unwrap();
        let mut state = SyncState::default();
        state.record(&period("20240201-20240301"), fetched, "20240201-a9.csv".to_string());
        state.record(&period("20240101-20240201"), fetched, "20240101-z1.csv".to_string());

        let links = refresh(&config, &state).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(
            target_of(&config, "report-current.csv"),
            PathBuf::from("data/20240201-a9.csv")
        );
        assert_eq!(
            target_of(&config, "report-1.csv"),
            PathBuf::from("data/20240101-z1.csv")
        );
        assert_eq!(
            target_of(&config, "report-2.csv"),
            PathBuf::from("data/20240201-b7.csv")
        );
    }

    #[test]
    fn recorded_artifact_without_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        touch(&config, "20240101-a2.csv");

        let fetched = Utc.with_ymd_and_hms(2024, 2, 14, 0, 0, 0).unwrap();
        let mut state = SyncState::default();
        state.record(&period("20240201-20240301"), fetched, "20240201-a3.csv".to_string());

        let links = refresh(&config, &state).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(
            target_of(&config, "report-current.csv"),
            PathBuf::from("data/20240101-a2.csv")
        );
    }

    #[test]
    fn rank_parsing() {
        assert_eq!(link_rank("report-current.csv"), Some(0));
        assert_eq!(link_rank("report-2.csv"), Some(2));
        assert_eq!(link_rank("report-0.csv"), None);
        assert_eq!(link_rank("report-x.csv"), None);
        assert_eq!(link_rank("report-current.csv.tmp"), None);
    }
}
