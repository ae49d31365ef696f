//! Browser automation core for exporting NetSuite reports.
//!
//! The crate logs into a NetSuite account through the real login UI,
//! answers the security-question challenge when one appears, then walks a
//! list of saved-search and report URLs and downloads each one as a
//! tabular file. UI lookups go through ordered candidate selector lists
//! and exports through ordered fallback strategies, so a single markup
//! change degrades one path instead of the whole batch.
//!
//! [`run_batch`] is the main entry point. Everything underneath is
//! generic over the [`driver::PageDriver`] trait; [`driver::FakeDriver`]
//! lets the flows run in unit tests without a browser.

pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod download;
pub mod driver;
pub mod error;
pub mod export;
pub mod resolver;
pub mod session;

pub use config::{Credentials, ExporterConfig, Timeouts};
pub use error::{ExportError, Result};
pub use export::{ExportOutcome, ExportTarget, TargetKind};
pub use session::{BrowserSession, SessionLease, run_batch, run_with_lease};
