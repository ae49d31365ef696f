//! First-match-wins element resolution.
//!
//! Every UI interaction in this crate goes through [`resolve_and_act`]: an
//! ordered list of candidate locators is probed until one is visible, the
//! requested action runs against it, and any error from an individual
//! candidate abandons that candidate rather than the whole call. When the
//! list is exhausted a diagnostics artifact is captured so the markup the
//! candidates failed against survives for postmortem.

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::diagnostics::DiagnosticsSink;
use crate::driver::{Locator, PageDriver};

/// One way to locate an element, with a short role label for logs.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub locator: Locator,
    pub label: &'static str,
}

impl Candidate {
    pub const fn css(pattern: &'static str, label: &'static str) -> Self {
        Self {
            locator: Locator::Css(pattern),
            label,
        }
    }

    pub const fn xpath(pattern: &'static str, label: &'static str) -> Self {
        Self {
            locator: Locator::XPath(pattern),
            label,
        }
    }
}

/// What to do with the first visible candidate.
#[derive(Debug, Clone, Copy)]
pub enum ElementAction<'a> {
    Click,
    Fill(&'a str),
}

impl ElementAction<'_> {
    fn kind(&self) -> &'static str {
        match self {
            ElementAction::Click => "click",
            ElementAction::Fill(_) => "fill",
        }
    }
}

/// Tries `candidates` in order and performs `action` on the first visible
/// one. Returns whether any candidate succeeded; on total failure a
/// diagnostics artifact labeled from `description` is captured exactly
/// once.
pub async fn resolve_and_act<D: PageDriver + ?Sized>(
    driver: &D,
    candidates: &[Candidate],
    action: ElementAction<'_>,
    description: &str,
    timeouts: &Timeouts,
    diagnostics: &DiagnosticsSink,
) -> bool {
    for candidate in candidates {
        let visible = match timeout(timeouts.probe, driver.is_visible(&candidate.locator)).await {
            Ok(Ok(visible)) => visible,
            Ok(Err(err)) => {
                debug!(target: "nsx", locator = %candidate.locator, error = %err, "probe failed");
                false
            }
            Err(_) => false,
        };
        if !visible {
            continue;
        }

        let acted = match action {
            ElementAction::Click => {
                timeout(timeouts.action, driver.click(&candidate.locator)).await
            }
            ElementAction::Fill(value) => {
                timeout(timeouts.action, driver.fill(&candidate.locator, value)).await
            }
        };
        match acted {
            Ok(Ok(())) => {
                info!(
                    target: "nsx",
                    locator = %candidate.locator,
                    label = candidate.label,
                    "{description}: {} done",
                    action.kind()
                );
                return true;
            }
            Ok(Err(err)) => {
                debug!(
                    target: "nsx",
                    locator = %candidate.locator,
                    error = %err,
                    "{description}: candidate failed, trying next"
                );
            }
            Err(_) => {
                debug!(
                    target: "nsx",
                    locator = %candidate.locator,
                    "{description}: candidate timed out, trying next"
                );
            }
        }
    }

    warn!(target: "nsx", "{description}: no candidate matched");
    let label = format!("{}_{}_error", slug(description), action.kind());
    diagnostics.capture(driver, &label).await;
    false
}

fn slug(description: &str) -> String {
    description.to_ascii_lowercase().replace(' ', "_")
}
