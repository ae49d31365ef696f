//! Report export engine.
//!
//! Each target is exported by walking an ordered list of strategies until
//! one yields a downloaded file. Strategy failures are swallowed; the
//! engine reports per-target outcomes and never aborts the batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::diagnostics::DiagnosticsSink;
use crate::download::{self, DirSnapshot};
use crate::driver::PageDriver;
use crate::error::Result;
use crate::resolver::{Candidate, ElementAction, resolve_and_act};

/// Row cap appended to rewritten saved-search export URLs.
pub const EXPORT_ROW_CAP: u32 = 1000;

/// What kind of page a target URL points at, which decides the export path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    SavedSearch,
    StandardReport,
}

/// One report URL to export.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub url: String,
    pub kind: TargetKind,
}

impl ExportTarget {
    pub fn new(url: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// Classifies a URL by its path markers. Saved-search result pages use
    /// `searchresults.nl` or carry a `searchid=` parameter; everything else
    /// is treated as a standard report.
    pub fn classify(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = if url.contains("searchresults.nl") || url.contains("searchid=") {
            TargetKind::SavedSearch
        } else {
            TargetKind::StandardReport
        };
        Self { url, kind }
    }
}

/// Per-target result. Exactly one of `file` and `error` is populated.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub url: String,
    pub kind: TargetKind,
    pub file: Option<PathBuf>,
    pub error: Option<String>,
}

impl ExportOutcome {
    pub fn succeeded(&self) -> bool {
        self.file.is_some()
    }
}

/// Saved-search export controls, most specific first. The CSV/Excel icons
/// are the stable UI; the text anchors cover list-styled result pages.
const SAVED_EXPORT_CONTROLS: &[Candidate] = &[
    Candidate::css(r#"[id*="csv"]"#, "csv control by id"),
    Candidate::css(r#"[id*="CSV"]"#, "csv control by id upper"),
    Candidate::css(r#"img[alt*="CSV"]"#, "csv icon"),
    Candidate::css(r#"img[alt*="Excel"]"#, "excel icon"),
    Candidate::css(r#"[id*="excel"]"#, "excel control by id"),
    Candidate::xpath(r#"//a[contains(., "Export")]"#, "export anchor"),
    Candidate::xpath(r#"//span[contains(., "Export")]"#, "export span"),
    Candidate::css(r#"div[id*="export"]"#, "export div"),
    Candidate::css(r#"a[id*="export"]"#, "export anchor by id"),
    Candidate::css(r#"input[value*="Export"]"#, "export input"),
    Candidate::xpath(r#"//a[contains(., "CSV")]"#, "csv anchor text"),
    Candidate::xpath(r#"//a[contains(., "Excel")]"#, "excel anchor text"),
];

/// Standard-report export controls. Reports render their toolbar in an
/// iframe-free shell, so plain text matches work.
const REPORT_EXPORT_CONTROLS: &[Candidate] = &[
    Candidate::xpath(r#"//*[normalize-space(text())="Export"]"#, "export text"),
    Candidate::xpath(r#"//button[contains(., "Export")]"#, "export button"),
    Candidate::css(r#"[id*="export"]"#, "export by id"),
    Candidate::css(r#"[class*="export"]"#, "export by class"),
    Candidate::xpath(r#"//*[normalize-space(text())="Excel"]"#, "excel text"),
    Candidate::xpath(r#"//a[contains(., "Excel")]"#, "excel anchor"),
];

/// Fallback menus that hide the export items behind a dropdown.
const MENU_CONTROLS: &[Candidate] = &[
    Candidate::css(r#"[id*="menu"]"#, "menu by id"),
    Candidate::css(r#"[class*="dropdown"]"#, "dropdown by class"),
];

const EXCEL_MENU_ITEM: &[Candidate] = &[Candidate::xpath(
    r#"//*[contains(., "Excel")]"#,
    "excel menu item",
)];

/// Builds the in-page script that rewrites the current results URL into a
/// direct export URL and navigates to it.
fn rewrite_script(row_cap: u32) -> String {
    format!(
        r#"(() => {{
    let url = window.location.href.replace("searchresults.nl", "searchresults.xls");
    if (!url.includes("csv=")) {{
        url += "&csv=Export&OfficeXML=T&size={row_cap}";
    }}
    window.location.href = url;
    return url;
}})()"#
    )
}

pub struct ExportEngine<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    timeouts: &'a Timeouts,
    download_dir: &'a Path,
    diagnostics: &'a DiagnosticsSink,
}

impl<'a, D: PageDriver + ?Sized> ExportEngine<'a, D> {
    pub fn new(
        driver: &'a D,
        timeouts: &'a Timeouts,
        download_dir: &'a Path,
        diagnostics: &'a DiagnosticsSink,
    ) -> Self {
        Self {
            driver,
            timeouts,
            download_dir,
            diagnostics,
        }
    }

    /// Exports one target. All failure modes collapse into the outcome's
    /// `error` field so the caller can keep iterating the batch.
    pub async fn export(&self, target: &ExportTarget) -> ExportOutcome {
        info!(target: "nsx", url = %target.url, kind = ?target.kind, "exporting report");
        let result = match target.kind {
            TargetKind::SavedSearch => self.export_saved_search(target).await,
            TargetKind::StandardReport => self.export_report(target).await,
        };
        match result {
            Ok(Some(file)) => {
                info!(target: "nsx", file = %file.display(), "export complete");
                ExportOutcome {
                    url: target.url.clone(),
                    kind: target.kind,
                    file: Some(file),
                    error: None,
                }
            }
            Ok(None) => {
                warn!(target: "nsx", url = %target.url, "no export path produced a file");
                self.diagnostics
                    .capture(self.driver, "export_not_found")
                    .await;
                ExportOutcome {
                    url: target.url.clone(),
                    kind: target.kind,
                    file: None,
                    error: Some("no export control produced a download".to_string()),
                }
            }
            Err(err) => {
                warn!(target: "nsx", url = %target.url, error = %err, "export failed");
                self.diagnostics.capture(self.driver, "export_error").await;
                ExportOutcome {
                    url: target.url.clone(),
                    kind: target.kind,
                    file: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Saved-search strategy ladder: visible export control, then URL
    /// rewrite, then a filesystem sweep for whatever did land.
    async fn export_saved_search(&self, target: &ExportTarget) -> Result<Option<PathBuf>> {
        self.goto_settled(&target.url, self.timeouts.results_settle)
            .await?;
        self.diagnostics.capture(self.driver, "search_page").await;

        if let Some(file) = self.click_download(SAVED_EXPORT_CONTROLS).await? {
            return Ok(Some(file));
        }

        debug!(target: "nsx", "no export control matched, rewriting results URL");
        if let Some(file) = self.rewrite_download().await? {
            return Ok(Some(file));
        }

        // Last resort: the export may have fired without us observing it.
        tokio::time::sleep(self.timeouts.scan_settle).await;
        Ok(download::latest_tabular_file(self.download_dir)?)
    }

    /// Standard reports only have the toolbar path, with a menu fallback
    /// for skins that tuck Export into a dropdown.
    async fn export_report(&self, target: &ExportTarget) -> Result<Option<PathBuf>> {
        self.goto_settled(&target.url, self.timeouts.report_settle)
            .await?;
        self.diagnostics.capture(self.driver, "report_page").await;

        let snapshot = DirSnapshot::take(self.download_dir)?;
        let mut clicked = self.click_first_present(REPORT_EXPORT_CONTROLS).await;
        if !clicked {
            clicked = self.open_export_menu().await;
        }
        if !clicked {
            return Ok(None);
        }

        // Some report skins pop a format chooser after Export; clicking
        // Excel there is harmless and silent when no chooser appeared.
        let _ = self.click_first_present(EXCEL_MENU_ITEM).await;

        let file = snapshot
            .wait_for_new_file(self.timeouts.download, self.timeouts.download_poll)
            .await?;
        Ok(file)
    }

    async fn open_export_menu(&self) -> bool {
        if !resolve_and_act(
            self.driver,
            MENU_CONTROLS,
            ElementAction::Click,
            "export menu",
            self.timeouts,
            self.diagnostics,
        )
        .await
        {
            return false;
        }
        tokio::time::sleep(self.timeouts.menu_settle).await;
        resolve_and_act(
            self.driver,
            EXCEL_MENU_ITEM,
            ElementAction::Click,
            "excel menu item",
            self.timeouts,
            self.diagnostics,
        )
        .await
    }

    /// Strategy 1: click the first present export control and await the
    /// download. Presence is enough; the icon controls are routinely
    /// rendered without a box model while still being clickable.
    async fn click_download(&self, controls: &[Candidate]) -> Result<Option<PathBuf>> {
        let snapshot = DirSnapshot::take(self.download_dir)?;
        if !self.click_first_present(controls).await {
            return Ok(None);
        }
        let file = snapshot
            .wait_for_new_file(self.timeouts.download, self.timeouts.download_poll)
            .await?;
        Ok(file)
    }

    /// Probes `controls` for presence in order and clicks the first hit,
    /// each probe and click individually time-bounded. Failures move on
    /// to the next candidate without any diagnostics capture.
    async fn click_first_present(&self, controls: &[Candidate]) -> bool {
        for candidate in controls {
            let present =
                match timeout(self.timeouts.probe, self.driver.exists(&candidate.locator)).await {
                    Ok(Ok(present)) => present,
                    Ok(Err(err)) => {
                        debug!(target: "nsx", control = %candidate.locator, error = %err, "probe failed");
                        false
                    }
                    Err(_) => false,
                };
            if !present {
                continue;
            }
            match timeout(self.timeouts.action, self.driver.click(&candidate.locator)).await {
                Ok(Ok(())) => {
                    debug!(target: "nsx", control = %candidate.locator, "export control clicked");
                    return true;
                }
                Ok(Err(err)) => {
                    debug!(target: "nsx", control = %candidate.locator, error = %err, "click failed, trying next");
                }
                Err(_) => {
                    debug!(target: "nsx", control = %candidate.locator, "click timed out, trying next");
                }
            }
        }
        false
    }

    /// Strategy 2: rewrite the results URL into the direct export form and
    /// navigate to it, which triggers the download server-side.
    async fn rewrite_download(&self) -> Result<Option<PathBuf>> {
        let snapshot = DirSnapshot::take(self.download_dir)?;
        let mut raced = false;
        if let Err(err) = self.driver.evaluate(&rewrite_script(EXPORT_ROW_CAP)).await {
            // Navigating to a download URL aborts the evaluation with a
            // "Download is starting" message; the download itself is fine.
            if err.to_string().contains("Download is starting") {
                debug!(target: "nsx", "evaluation aborted by download start");
                raced = true;
            } else {
                return Err(err);
            }
        }

        let file = snapshot
            .wait_for_new_file(self.timeouts.download, self.timeouts.download_poll)
            .await?;
        if file.is_none() && raced {
            // The race means a download definitely started; give a slow
            // server one more grace window.
            tokio::time::sleep(self.timeouts.download_race_grace).await;
            return Ok(snapshot.new_completed_file()?);
        }
        Ok(file)
    }

    async fn goto_settled(&self, url: &str, settle: Duration) -> Result<()> {
        self.driver.goto(url, self.timeouts.page_load).await?;
        if let Err(err) = self.driver.wait_for_idle(self.timeouts.network_idle).await {
            warn!(target: "nsx", error = %err, "idle wait failed, relying on settle delay");
        }
        tokio::time::sleep(settle).await;
        Ok(())
    }
}
