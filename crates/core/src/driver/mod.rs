//! The seam between the automation state machines and the browser.
//!
//! Everything above this module talks to the page through [`PageDriver`],
//! so the login and export flows can be exercised against the scripted
//! [`FakeDriver`] while production runs on the CDP-backed [`CdpDriver`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub mod cdp;
pub mod fake;

pub use cdp::CdpDriver;
pub use fake::FakeDriver;

/// A way to address an element on the page.
///
/// NetSuite's markup is not contractually stable, so call sites never rely
/// on a single locator; they carry ordered lists of these, most specific
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    Css(&'static str),
    XPath(&'static str),
}

impl Locator {
    pub const fn pattern(&self) -> &'static str {
        match self {
            Locator::Css(pattern) | Locator::XPath(pattern) => pattern,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(pattern) => write!(f, "css={pattern}"),
            Locator::XPath(pattern) => write!(f, "xpath={pattern}"),
        }
    }
}

/// Operations the automation needs from the single page a session owns.
///
/// All methods are cheap to call repeatedly and report element absence as
/// `Ok(false)` / `Ok(None)` rather than an error; errors are reserved for
/// the browser connection itself misbehaving.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigates and waits for the load to finish, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Waits for the page to stop navigating, bounded by `timeout`.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<()>;

    /// Whether the first match for `locator` is present and visible.
    async fn is_visible(&self, locator: &Locator) -> Result<bool>;

    /// Whether any match for `locator` exists, visible or not.
    async fn exists(&self, locator: &Locator) -> Result<bool>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Clears the first match for `locator` and types `value` into it.
    async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Text content of the first match, `None` when nothing matches.
    async fn first_text(&self, locator: &Locator) -> Result<Option<String>>;

    /// Runs a script for its side effects.
    async fn evaluate(&self, script: &str) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Serialized DOM of the current page.
    async fn content(&self) -> Result<String>;
}
