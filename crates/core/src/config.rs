//! Tunables and credentials for a batch run.
//!
//! Every wait in the core is bounded by a value from [`Timeouts`]; nothing
//! reads ambient globals or environment variables, so tests inject small
//! values and callers own the defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Bounds for every suspension point in the core.
///
/// The settle delays exist because NetSuite's load-state signals are
/// unreliable: a page can report idle while its grid is still rendering,
/// so fixed waits are layered on top of the bounded idle waits.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Per-candidate existence/visibility probe. Short, so that absent
    /// candidates are cheap to skip.
    pub probe: Duration,
    /// Click/fill on a resolved element.
    pub action: Duration,
    /// Full page navigation.
    pub page_load: Duration,
    /// Post-submit wait for the network to go quiet.
    pub network_idle: Duration,
    /// Wait for a triggered download to land on disk.
    pub download: Duration,
    /// Poll interval while watching the download directory.
    pub download_poll: Duration,
    /// Settle after the login form is submitted.
    pub post_login_settle: Duration,
    /// Settle after each security-question submission.
    pub challenge_settle: Duration,
    /// Settle after pinning the session to the account home page.
    pub pin_settle: Duration,
    /// Settle while saved-search results render.
    pub results_settle: Duration,
    /// Settle while a standard report renders.
    pub report_settle: Duration,
    /// Settle before scanning the download directory as a last resort.
    pub scan_settle: Duration,
    /// Settle after opening an export menu before clicking its item.
    pub menu_settle: Duration,
    /// Extra grace period when an export trigger reports that a download
    /// already began.
    pub download_race_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(1),
            action: Duration::from_secs(5),
            page_load: Duration::from_secs(60),
            network_idle: Duration::from_secs(60),
            download: Duration::from_secs(120),
            download_poll: Duration::from_millis(500),
            post_login_settle: Duration::from_secs(3),
            challenge_settle: Duration::from_secs(2),
            pin_settle: Duration::from_secs(2),
            results_settle: Duration::from_secs(5),
            report_settle: Duration::from_secs(3),
            scan_settle: Duration::from_secs(5),
            menu_settle: Duration::from_secs(1),
            download_race_grace: Duration::from_secs(15),
        }
    }
}

/// Configuration for one exporter session.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub timeouts: Timeouts,
    /// Where Chrome drops downloads and where diagnostics artifacts go.
    pub download_dir: PathBuf,
    pub headless: bool,
    /// Explicit Chrome/Chromium executable; otherwise probed from PATH
    /// and well-known install locations.
    pub chrome_executable: Option<PathBuf>,
}

impl ExporterConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            timeouts: Timeouts::default(),
            download_dir: download_dir.into(),
            headless: true,
            chrome_executable: None,
        }
    }
}

/// Login material for one NetSuite account. Immutable for the lifetime of
/// a session.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub account_id: String,
    /// Company-specific URL override; see [`Credentials::account_base_url`].
    pub base_url: Option<String>,
    /// Candidate answers for the security-question page, in the order they
    /// should be tried. One login form serves several distinct questions,
    /// so callers supply every plausible answer.
    pub security_answers: Vec<String>,
}

impl Credentials {
    /// The account home used to pin the session after login.
    pub fn account_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.app.netsuite.com", self.account_id))
    }

    /// Splits a comma-separated answer list, trimming blanks. A value with
    /// no commas is a one-element list.
    pub fn parse_security_answers(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|answer| !answer.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(base_url: Option<&str>) -> Credentials {
        Credentials {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
            account_id: "1234567".into(),
            base_url: base_url.map(str::to_string),
            security_answers: Vec::new(),
        }
    }

    #[test]
    fn base_url_defaults_to_account_host() {
        assert_eq!(
            credentials(None).account_base_url(),
            "https://1234567.app.netsuite.com"
        );
    }

    #[test]
    fn base_url_override_wins() {
        assert_eq!(
            credentials(Some("https://na2.netsuite.com")).account_base_url(),
            "https://na2.netsuite.com"
        );
    }

    #[test]
    fn answers_split_on_commas_and_trim() {
        assert_eq!(
            Credentials::parse_security_answers("blue, mother's maiden ,seoul"),
            vec!["blue", "mother's maiden", "seoul"]
        );
    }

    #[test]
    fn single_answer_is_one_element_list() {
        assert_eq!(Credentials::parse_security_answers("blue"), vec!["blue"]);
    }

    #[test]
    fn blank_answers_are_dropped() {
        assert!(Credentials::parse_security_answers(" , ,").is_empty());
    }
}
