//! Download-directory watching.
//!
//! Chrome writes an in-progress download as `name.crdownload` and renames
//! it when complete, so a completed report is simply a new file with a
//! tabular extension. The watcher snapshots the directory before an export
//! is triggered and polls for a file that was not there before; the same
//! extension filter backs the last-resort directory scan, and keeps both
//! from ever picking up diagnostics artifacts.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::time::Instant;
use tracing::debug;

/// File extensions a report export can produce.
pub const TABULAR_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

fn is_tabular(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            TABULAR_EXTENSIONS.contains(&ext.as_str())
        })
}

/// The set of files present in a download directory at one instant.
pub struct DirSnapshot {
    dir: PathBuf,
    seen: HashSet<PathBuf>,
}

impl DirSnapshot {
    pub fn take(dir: &Path) -> io::Result<Self> {
        let seen = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        Ok(Self {
            dir: dir.to_path_buf(),
            seen,
        })
    }

    /// Polls until a completed tabular file that was not in the snapshot
    /// appears, or `timeout` elapses.
    pub async fn wait_for_new_file(
        &self,
        timeout: std::time::Duration,
        poll: std::time::Duration,
    ) -> io::Result<Option<PathBuf>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(path) = self.new_completed_file()? {
                debug!(target: "nsx", path = %path.display(), "new download detected");
                return Ok(Some(path));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Single non-blocking check for a completed new tabular file.
    pub fn new_completed_file(&self) -> io::Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if self.seen.contains(&path) || !is_tabular(&path) {
                continue;
            }
            return Ok(Some(path));
        }
        Ok(None)
    }
}

/// The most recently created tabular file in `dir`, if any.
pub fn latest_tabular_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_tabular(&path) {
            continue;
        }
        let metadata = entry.metadata()?;
        let stamp = metadata.created().or_else(|_| metadata.modified())?;
        if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
            newest = Some((stamp, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn detects_file_created_after_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.csv"), b"a,b").unwrap();
        let snapshot = DirSnapshot::take(dir.path()).unwrap();
        std::fs::write(dir.path().join("fresh.xlsx"), b"x").unwrap();

        let found = snapshot
            .wait_for_new_file(Duration::from_millis(100), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(found.unwrap().file_name().unwrap(), "fresh.xlsx");
    }

    #[tokio::test]
    async fn ignores_in_progress_and_diagnostic_files() {
        let dir = TempDir::new().unwrap();
        let snapshot = DirSnapshot::take(dir.path()).unwrap();
        std::fs::write(dir.path().join("report.xlsx.crdownload"), b"x").unwrap();
        std::fs::write(dir.path().join("login_error.png"), b"x").unwrap();
        std::fs::write(dir.path().join("login_error.html"), b"x").unwrap();

        let found = snapshot
            .wait_for_new_file(Duration::from_millis(30), Duration::from_millis(5))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn times_out_on_quiet_directory() {
        let dir = TempDir::new().unwrap();
        let snapshot = DirSnapshot::take(dir.path()).unwrap();
        let found = snapshot
            .wait_for_new_file(Duration::from_millis(30), Duration::from_millis(5))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn latest_file_prefers_most_recent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("first.csv"), b"a").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(dir.path().join("second.xls"), b"b").unwrap();

        let latest = latest_tabular_file(dir.path()).unwrap().unwrap();
        assert_eq!(latest.file_name().unwrap(), "second.xls");
    }

    #[test]
    fn latest_file_none_when_only_diagnostics_present() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("export_error.png"), b"x").unwrap();
        assert!(latest_tabular_file(dir.path()).unwrap().is_none());
    }
}
