//! Browser session lifecycle and batch orchestration.
//!
//! [`run_batch`] owns the whole flow: launch Chrome, log in, export every
//! target in order, and tear the browser down no matter how the run ended.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::config::{Credentials, ExporterConfig};
use crate::diagnostics::DiagnosticsSink;
use crate::driver::cdp::{CdpDriver, launch_browser};
use crate::driver::PageDriver;
use crate::error::Result;
use crate::export::{ExportEngine, ExportOutcome, ExportTarget};

/// Something that must be released exactly once when the batch ends,
/// successful or not. The live implementation closes the browser.
#[async_trait]
pub trait SessionLease: Send {
    async fn release(self: Box<Self>);
}

/// A launched Chrome instance with its event loop and automation page.
pub struct BrowserSession {
    browser: chromiumoxide::Browser,
    handler: JoinHandle<()>,
    driver: CdpDriver,
}

impl BrowserSession {
    pub async fn launch(config: &ExporterConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.download_dir)?;

        let (browser, mut handler) = launch_browser(config).await?;
        // The handler stream must be polled for the whole session or CDP
        // calls stall.
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(anyhow::Error::new)?;
        let driver = CdpDriver::prepare(page, config).await?;

        Ok(Self {
            browser,
            handler,
            driver,
        })
    }

    pub fn driver(&self) -> CdpDriver {
        self.driver.clone()
    }

    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(target: "nsx", error = %err, "browser close failed");
        }
        // Reap the Chromium child before dropping the event loop, or it
        // lingers as a zombie.
        if let Err(err) = self.browser.wait().await {
            warn!(target: "nsx", error = %err, "browser did not exit cleanly");
        }
        self.handler.abort();
    }
}

#[async_trait]
impl SessionLease for BrowserSession {
    async fn release(self: Box<Self>) {
        self.close().await;
    }
}

/// Launches a browser and runs the full login-then-export batch.
///
/// Returns `Err` only for launch or login failures; individual export
/// failures are carried inside the returned outcomes.
pub async fn run_batch(
    config: &ExporterConfig,
    credentials: &Credentials,
    targets: &[ExportTarget],
) -> Result<Vec<ExportOutcome>> {
    let session = BrowserSession::launch(config).await?;
    let driver = session.driver();
    run_with_lease(&driver, Box::new(session), config, credentials, targets).await
}

/// Batch core, generic over the driver so the flow is testable without a
/// browser. The lease is released on every exit path.
pub async fn run_with_lease<D: PageDriver + ?Sized>(
    driver: &D,
    lease: Box<dyn SessionLease>,
    config: &ExporterConfig,
    credentials: &Credentials,
    targets: &[ExportTarget],
) -> Result<Vec<ExportOutcome>> {
    let result = drive_batch(driver, config, credentials, targets).await;
    lease.release().await;
    result
}

async fn drive_batch<D: PageDriver + ?Sized>(
    driver: &D,
    config: &ExporterConfig,
    credentials: &Credentials,
    targets: &[ExportTarget],
) -> Result<Vec<ExportOutcome>> {
    let diag_dir = diagnostics_dir(&config.download_dir);
    std::fs::create_dir_all(&diag_dir)?;
    let diagnostics = DiagnosticsSink::new(diag_dir);

    Authenticator::new(driver, &config.timeouts, &diagnostics)
        .login(credentials)
        .await?;

    let engine = ExportEngine::new(driver, &config.timeouts, &config.download_dir, &diagnostics);
    let total = targets.len();
    let mut outcomes = Vec::with_capacity(total);
    for (index, target) in targets.iter().enumerate() {
        info!(target: "nsx", report = index + 1, total, url = %target.url, "starting export");
        outcomes.push(engine.export(target).await);
    }
    Ok(outcomes)
}

/// Diagnostics live next to the downloads, not inside them, so captures
/// never trip the new-file detector.
fn diagnostics_dir(download_dir: &Path) -> std::path::PathBuf {
    download_dir.join("diagnostics")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::config::Timeouts;
    use crate::driver::FakeDriver;
    use crate::error::ExportError;
    use crate::export::TargetKind;

    struct FlagLease(Arc<AtomicBool>);

    #[async_trait]
    impl SessionLease for FlagLease {
        async fn release(self: Box<Self>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn fast_config(dir: &Path) -> ExporterConfig {
        let mut config = ExporterConfig::new(dir);
        config.timeouts = Timeouts {
            probe: Duration::from_millis(20),
            action: Duration::from_millis(50),
            page_load: Duration::from_millis(50),
            network_idle: Duration::from_millis(20),
            download: Duration::from_millis(200),
            download_poll: Duration::from_millis(10),
            post_login_settle: Duration::ZERO,
            challenge_settle: Duration::ZERO,
            pin_settle: Duration::ZERO,
            results_settle: Duration::ZERO,
            report_settle: Duration::ZERO,
            scan_settle: Duration::ZERO,
            menu_settle: Duration::ZERO,
            download_race_grace: Duration::ZERO,
        };
        config
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
            account_id: "1234567".into(),
            base_url: None,
            security_answers: Vec::new(),
        }
    }

    fn logged_in_driver() -> FakeDriver {
        let driver = FakeDriver::new("about:blank");
        driver.set_visible(r#"input[name="email"]"#);
        driver.set_visible(r#"input[name="password"]"#);
        driver.set_visible(r#"input[type="submit"]"#);
        driver.advance_url_on(r#"input[type="submit"]"#);
        driver.queue_url("https://1234567.app.netsuite.com/app/center/card.nl");
        driver
    }

    fn search_target(id: u32) -> ExportTarget {
        ExportTarget::classify(format!(
            "https://1234567.app.netsuite.com/app/common/search/searchresults.nl?searchid={id}"
        ))
    }

    #[tokio::test]
    async fn login_failure_aborts_batch_and_releases_lease() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver::new("about:blank");
        let released = Arc::new(AtomicBool::new(false));
        let config = fast_config(dir.path());

        let err = run_with_lease(
            &driver,
            Box::new(FlagLease(released.clone())),
            &config,
            &credentials(),
            &[search_target(1)],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExportError::Authentication { .. }));
        assert!(released.load(Ordering::SeqCst));
        // No report URL was ever visited.
        assert_eq!(driver.goto_count("searchresults.nl"), 0);
    }

    fn report_target(id: u32) -> ExportTarget {
        ExportTarget::classify(format!(
            "https://1234567.app.netsuite.com/app/reporting/reportrunner.nl?cr={id}"
        ))
    }

    #[tokio::test]
    async fn batch_recovers_after_a_failing_target() {
        let dir = TempDir::new().unwrap();
        let driver = logged_in_driver();
        driver.set_visible(r#"[id*="csv"]"#);
        driver.download_on_click(r#"[id*="csv"]"#, dir.path().join("first.csv"));
        driver.download_on_click(r#"[id*="csv"]"#, dir.path().join("third.csv"));
        let released = Arc::new(AtomicBool::new(false));
        let config = fast_config(dir.path());

        // The report target exposes no export controls, so it fails while
        // the searches around it export normally.
        let targets = [search_target(1), report_target(2), search_target(3)];
        let outcomes = run_with_lease(
            &driver,
            Box::new(FlagLease(released.clone())),
            &config,
            &credentials(),
            &targets,
        )
        .await
        .unwrap();

        assert!(released.load(Ordering::SeqCst));
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].url, targets[0].url);
        assert_eq!(outcomes[0].kind, TargetKind::SavedSearch);
        assert!(outcomes[0].succeeded());
        assert!(outcomes[0].file.as_ref().unwrap().ends_with("first.csv"));
        assert!(!outcomes[1].succeeded());
        assert!(outcomes[1].error.is_some());
        // The batch recovers: a later target still exports after the
        // failure.
        assert_eq!(outcomes[2].url, targets[2].url);
        assert!(outcomes[2].succeeded());
        assert!(outcomes[2].file.as_ref().unwrap().ends_with("third.csv"));
    }
}
