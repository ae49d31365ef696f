use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nsx_core::{Credentials, ExportTarget, ExporterConfig};

/// Log into NetSuite and export saved searches and reports as tabular
/// files.
#[derive(Debug, Parser)]
#[command(name = "nsx", version, about)]
pub struct Cli {
    /// Login email.
    #[arg(long, env = "NETSUITE_EMAIL")]
    pub email: String,

    /// Login password.
    #[arg(long, env = "NETSUITE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// NetSuite account id, e.g. 1234567 or 1234567-sb1.
    #[arg(long, env = "NETSUITE_ACCOUNT_ID")]
    pub account_id: String,

    /// Override the account application URL derived from the account id.
    #[arg(long, env = "NETSUITE_BASE_URL")]
    pub base_url: Option<String>,

    /// Comma-separated candidate answers for the security-question
    /// challenge, tried in order.
    #[arg(long, env = "NETSUITE_SECURITY_ANSWERS", hide_env_values = true)]
    pub security_answers: Option<String>,

    /// Report or saved-search URL to export. Repeatable.
    #[arg(
        long = "report-url",
        env = "NETSUITE_REPORT_URLS",
        value_delimiter = ',',
        required = true
    )]
    pub report_urls: Vec<String>,

    /// Directory downloads land in.
    #[arg(long, env = "NSX_DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Run Chrome with a visible window.
    #[arg(long)]
    pub headed: bool,

    /// Path to the Chrome or Chromium binary.
    #[arg(long, env = "NSX_CHROME")]
    pub chrome: Option<PathBuf>,

    /// Emit the batch result as JSON instead of a text summary.
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Page navigation timeout in milliseconds.
    #[arg(long, env = "NSX_PAGE_TIMEOUT_MS", default_value_t = 60_000)]
    pub page_timeout_ms: u64,

    /// Element interaction timeout in milliseconds.
    #[arg(long, env = "NSX_ELEMENT_TIMEOUT_MS", default_value_t = 5_000)]
    pub element_timeout_ms: u64,

    /// Download completion timeout in milliseconds.
    #[arg(long, env = "NSX_DOWNLOAD_TIMEOUT_MS", default_value_t = 120_000)]
    pub download_timeout_ms: u64,

    /// Network idle timeout in milliseconds.
    #[arg(long, env = "NSX_IDLE_TIMEOUT_MS", default_value_t = 60_000)]
    pub idle_timeout_ms: u64,
}

impl Cli {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
            account_id: self.account_id.clone(),
            base_url: self.base_url.clone(),
            security_answers: self
                .security_answers
                .as_deref()
                .map(Credentials::parse_security_answers)
                .unwrap_or_default(),
        }
    }

    pub fn config(&self) -> ExporterConfig {
        let mut config = ExporterConfig::new(&self.download_dir);
        config.headless = !self.headed;
        config.chrome_executable = self.chrome.clone();
        config.timeouts.page_load = Duration::from_millis(self.page_timeout_ms);
        config.timeouts.action = Duration::from_millis(self.element_timeout_ms);
        config.timeouts.download = Duration::from_millis(self.download_timeout_ms);
        config.timeouts.network_idle = Duration::from_millis(self.idle_timeout_ms);
        config
    }

    pub fn targets(&self) -> Vec<ExportTarget> {
        self.report_urls
            .iter()
            .map(ExportTarget::classify)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use nsx_core::TargetKind;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec![
            "nsx",
            "--email",
            "ops@example.com",
            "--password",
            "hunter2",
            "--account-id",
            "1234567",
        ];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn report_urls_are_classified() {
        let cli = parse(&[
            "--report-url",
            "https://x.app.netsuite.com/app/common/search/searchresults.nl?searchid=1",
            "--report-url",
            "https://x.app.netsuite.com/app/reporting/reportrunner.nl?cr=2",
        ]);
        let targets = cli.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].kind, TargetKind::SavedSearch);
        assert_eq!(targets[1].kind, TargetKind::StandardReport);
    }

    #[test]
    fn security_answers_are_split_and_trimmed() {
        let cli = parse(&[
            "--report-url",
            "https://x.app.netsuite.com/r.nl",
            "--security-answers",
            " blue , rex ,, 1984 ",
        ]);
        assert_eq!(
            cli.credentials().security_answers,
            vec!["blue", "rex", "1984"]
        );
    }

    #[test]
    fn timeout_overrides_reach_the_config() {
        let cli = parse(&[
            "--report-url",
            "https://x.app.netsuite.com/r.nl",
            "--download-timeout-ms",
            "5000",
        ]);
        let config = cli.config();
        assert_eq!(config.timeouts.download, Duration::from_millis(5000));
        assert_eq!(config.timeouts.page_load, Duration::from_millis(60_000));
        assert!(config.headless);
    }

    #[test]
    fn report_url_is_required() {
        let result = Cli::try_parse_from([
            "nsx",
            "--email",
            "a@b.c",
            "--password",
            "p",
            "--account-id",
            "1",
        ]);
        assert!(result.is_err());
    }
}
