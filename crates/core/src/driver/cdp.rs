//! CDP-backed driver on chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::ScreenshotParams;
use tracing::debug;

use crate::config::ExporterConfig;
use crate::driver::{Locator, PageDriver};
use crate::error::{ExportError, Result};

/// NetSuite serves a degraded login flow to pages that look automated.
const HIDE_WEBDRIVER_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });
"#;

/// Launches Chromium with automation-detection countermeasures.
///
/// The caller owns the returned [`Handler`] stream and must drive it for
/// the browser connection to make progress.
pub async fn launch_browser(config: &ExporterConfig) -> Result<(Browser, Handler)> {
    let chrome = match &config.chrome_executable {
        Some(path) => path.clone(),
        None => find_chrome().ok_or_else(|| {
            ExportError::BrowserLaunch(
                "Chrome/Chromium not found; install one or set an explicit path".to_string(),
            )
        })?,
    };
    debug!(target: "nsx", chrome = %chrome.display(), headless = config.headless, "launching browser");

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome)
        .window_size(1920, 1080)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check");
    if !config.headless {
        builder = builder.with_head();
    }
    let browser_config = builder.build().map_err(ExportError::BrowserLaunch)?;

    Browser::launch(browser_config)
        .await
        .map_err(|err| ExportError::BrowserLaunch(err.to_string()))
}

/// Finds a Chrome/Chromium executable on PATH or in well-known locations.
pub fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// [`PageDriver`] over one chromiumoxide [`Page`].
#[derive(Clone)]
pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    /// Wraps a fresh page: installs the webdriver-hiding init script and
    /// routes downloads into the configured directory.
    pub async fn prepare(page: Page, config: &ExporterConfig) -> Result<Self> {
        let init_script = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(HIDE_WEBDRIVER_SCRIPT)
            .build()
            .map_err(|err| ExportError::BrowserLaunch(err.to_string()))?;
        page.execute(init_script).await.map_err(anyhow::Error::new)?;

        let downloads = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(config.download_dir.to_string_lossy())
            .build()
            .map_err(ExportError::BrowserLaunch)?;
        page.execute(downloads).await.map_err(anyhow::Error::new)?;

        Ok(Self { page })
    }

    async fn find(&self, locator: &Locator) -> std::result::Result<Element, CdpError> {
        match locator {
            Locator::Css(selector) => self.page.find_element(*selector).await,
            Locator::XPath(selector) => self.page.find_xpath(*selector).await,
        }
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(timeout, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ExportError::Navigation {
                url: url.to_string(),
                source: anyhow::Error::new(err),
            }),
            Err(_) => Err(ExportError::Timeout {
                ms: timeout.as_millis() as u64,
                what: format!("navigation to {url}"),
            }),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(anyhow::Error::new)?;
        Ok(url.unwrap_or_default())
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(ExportError::Driver(anyhow::Error::new(err))),
            Err(_) => Err(ExportError::Timeout {
                ms: timeout.as_millis() as u64,
                what: "page to go idle".to_string(),
            }),
        }
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        let Ok(element) = self.find(locator).await else {
            return Ok(false);
        };
        // A node without a box model is detached or hidden.
        Ok(element.clickable_point().await.is_ok())
    }

    async fn exists(&self, locator: &Locator) -> Result<bool> {
        Ok(self.find(locator).await.is_ok())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let element = self.find(locator).await.map_err(anyhow::Error::new)?;
        let _ = element.scroll_into_view().await;
        element.click().await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let element = self.find(locator).await.map_err(anyhow::Error::new)?;
        element.focus().await.map_err(anyhow::Error::new)?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(anyhow::Error::new)?;
        element.type_str(value).await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    async fn first_text(&self, locator: &Locator) -> Result<Option<String>> {
        let Ok(element) = self.find(locator).await else {
            return Ok(None);
        };
        element.inner_text().await.map_err(|err| anyhow::Error::new(err).into())
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        self.page.evaluate(script).await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await
            .map_err(anyhow::Error::new)?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(|err| anyhow::Error::new(err).into())
    }
}
