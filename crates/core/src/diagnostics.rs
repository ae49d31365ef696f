//! Best-effort failure artifacts: a screenshot plus a DOM snapshot,
//! written next to the downloads so a markup change that broke a run can
//! be diagnosed after the fact. Capture failures are logged and dropped;
//! diagnostics must never turn a recoverable failure into a fatal one.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::driver::PageDriver;

pub struct DiagnosticsSink {
    dir: PathBuf,
}

impl DiagnosticsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `{prefix}.png` and `{prefix}.html` for the current page.
    pub async fn capture<D: PageDriver + ?Sized>(&self, driver: &D, prefix: &str) {
        let screenshot = self.dir.join(format!("{prefix}.png"));
        if let Err(err) = driver.screenshot(&screenshot).await {
            warn!(target: "nsx", prefix, error = %err, "screenshot capture failed");
        }

        match driver.content().await {
            Ok(html) => {
                let snapshot = self.dir.join(format!("{prefix}.html"));
                if let Err(err) = std::fs::write(&snapshot, html) {
                    warn!(target: "nsx", prefix, error = %err, "dom snapshot write failed");
                }
            }
            Err(err) => {
                warn!(target: "nsx", prefix, error = %err, "dom snapshot capture failed");
            }
        }

        debug!(target: "nsx", prefix, "diagnostics artifact captured");
    }
}
