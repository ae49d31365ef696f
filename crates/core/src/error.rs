use thiserror::Error;

/// Errors surfaced by the export core.
///
/// Only batch-fatal conditions travel through this type: a browser that
/// will not start, or a login that does not produce an authenticated
/// session. Per-target failures are absorbed into
/// [`ExportOutcome`](crate::export::ExportOutcome) instead.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to launch browser: {0}")]
    BrowserLaunch(String),

    #[error("authentication failed at {url}: {detail}")]
    Authentication { url: String, detail: String },

    #[error("security challenge unresolved after {attempts} answer attempt(s)")]
    ChallengeUnresolved { attempts: usize },

    #[error("navigation to {url} failed")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { ms: u64, what: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;
