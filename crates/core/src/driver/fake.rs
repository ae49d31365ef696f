//! Scripted in-memory driver for unit testing the automation flows
//! without a browser.
//!
//! The fake records every action it is asked to perform and serves
//! visibility, existence and text lookups from scripted state. Two extra
//! behaviors make login and export flows testable end to end:
//!
//! - clicking a selector registered with [`FakeDriver::advance_url_on`]
//!   pops the next URL from a queue, modeling the page transitions a real
//!   submit causes;
//! - clicking a selector registered with [`FakeDriver::download_on_click`]
//!   (or evaluating a script after [`FakeDriver::download_on_evaluate`])
//!   writes a file to disk, modeling Chrome completing a download.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{Locator, PageDriver};
use crate::error::{ExportError, Result};

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Idle,
    Click(String),
    Fill(String, String),
    Evaluate(String),
    Screenshot(PathBuf),
}

#[derive(Default)]
struct State {
    current_url: String,
    url_queue: VecDeque<String>,
    advance_on: Vec<String>,
    visible: HashSet<String>,
    present: HashSet<String>,
    texts: HashMap<String, String>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    downloads_on_click: HashMap<String, VecDeque<PathBuf>>,
    downloads_on_evaluate: VecDeque<PathBuf>,
    evaluate_error: Option<String>,
    actions: Vec<Action>,
}

pub struct FakeDriver {
    state: Mutex<State>,
}

impl FakeDriver {
    pub fn new(initial_url: &str) -> Self {
        let state = State {
            current_url: initial_url.to_string(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Queues the URL the page moves to on the next advancing click.
    pub fn queue_url(&self, url: &str) {
        self.state.lock().url_queue.push_back(url.to_string());
    }

    /// Clicking this selector pops the URL queue into the current URL.
    pub fn advance_url_on(&self, pattern: &str) {
        self.state.lock().advance_on.push(pattern.to_string());
    }

    /// Marks a selector as present and visible.
    pub fn set_visible(&self, pattern: &str) {
        let mut state = self.state.lock();
        state.visible.insert(pattern.to_string());
        state.present.insert(pattern.to_string());
    }

    /// Marks a selector as present in the DOM but not visible.
    pub fn set_present(&self, pattern: &str) {
        self.state.lock().present.insert(pattern.to_string());
    }

    pub fn set_text(&self, pattern: &str, text: &str) {
        let mut state = self.state.lock();
        state.present.insert(pattern.to_string());
        state.texts.insert(pattern.to_string(), text.to_string());
    }

    /// Clicks and fills on this selector fail with a driver error.
    pub fn fail_interaction(&self, pattern: &str) {
        self.state.lock().failing.insert(pattern.to_string());
    }

    /// Probes and clicks on this selector never resolve, modeling a hung
    /// browser call. Callers are expected to bound them with timeouts.
    pub fn stall(&self, pattern: &str) {
        self.state.lock().stalled.insert(pattern.to_string());
    }

    /// Each click on this selector writes the next queued file.
    pub fn download_on_click(&self, pattern: &str, path: impl Into<PathBuf>) {
        self.state
            .lock()
            .downloads_on_click
            .entry(pattern.to_string())
            .or_default()
            .push_back(path.into());
    }

    /// Each evaluated script writes the next queued file.
    pub fn download_on_evaluate(&self, path: impl Into<PathBuf>) {
        self.state
            .lock()
            .downloads_on_evaluate
            .push_back(path.into());
    }

    /// The next evaluate call fails with this message.
    pub fn fail_evaluate(&self, message: &str) {
        self.state.lock().evaluate_error = Some(message.to_string());
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().actions.clone()
    }

    pub fn click_count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .actions
            .iter()
            .filter(|action| matches!(action, Action::Click(p) if p == pattern))
            .count()
    }

    pub fn fill_count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .actions
            .iter()
            .filter(|action| matches!(action, Action::Fill(p, _) if p == pattern))
            .count()
    }

    pub fn goto_count(&self, url_fragment: &str) -> usize {
        self.state
            .lock()
            .actions
            .iter()
            .filter(|action| matches!(action, Action::Goto(u) if u.contains(url_fragment)))
            .count()
    }

    pub fn evaluate_count(&self) -> usize {
        self.state
            .lock()
            .actions
            .iter()
            .filter(|action| matches!(action, Action::Evaluate(_)))
            .count()
    }

    fn record(&self, action: Action) {
        self.state.lock().actions.push(action);
    }

    // The lock must not be held across the pending await.
    async fn stall_if_scripted(&self, pattern: &str) {
        let stalled = self.state.lock().stalled.contains(pattern);
        if stalled {
            futures::future::pending::<()>().await;
        }
    }
}

fn write_stub(path: &Path) {
    // The exported bytes are opaque to the core; an empty file is enough.
    let _ = std::fs::write(path, b"");
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.current_url = url.to_string();
        state.actions.push(Action::Goto(url.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().current_url.clone())
    }

    async fn wait_for_idle(&self, _timeout: Duration) -> Result<()> {
        self.record(Action::Idle);
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.stall_if_scripted(locator.pattern()).await;
        Ok(self.state.lock().visible.contains(locator.pattern()))
    }

    async fn exists(&self, locator: &Locator) -> Result<bool> {
        self.stall_if_scripted(locator.pattern()).await;
        Ok(self.state.lock().present.contains(locator.pattern()))
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let pattern = locator.pattern().to_string();
        self.stall_if_scripted(&pattern).await;
        let mut state = self.state.lock();
        state.actions.push(Action::Click(pattern.clone()));
        if state.failing.contains(&pattern) {
            return Err(ExportError::Driver(anyhow::anyhow!(
                "scripted failure clicking {pattern}"
            )));
        }
        if let Some(queue) = state.downloads_on_click.get_mut(&pattern) {
            if let Some(path) = queue.pop_front() {
                write_stub(&path);
            }
        }
        if state.advance_on.iter().any(|p| *p == pattern) {
            if let Some(next) = state.url_queue.pop_front() {
                state.current_url = next;
            }
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let pattern = locator.pattern().to_string();
        let mut state = self.state.lock();
        state
            .actions
            .push(Action::Fill(pattern.clone(), value.to_string()));
        if state.failing.contains(&pattern) {
            return Err(ExportError::Driver(anyhow::anyhow!(
                "scripted failure filling {pattern}"
            )));
        }
        Ok(())
    }

    async fn first_text(&self, locator: &Locator) -> Result<Option<String>> {
        Ok(self.state.lock().texts.get(locator.pattern()).cloned())
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.actions.push(Action::Evaluate(script.to_string()));
        // A queued download lands even when the evaluation itself errors,
        // matching Chrome aborting a script because navigation turned into
        // a download.
        if let Some(path) = state.downloads_on_evaluate.pop_front() {
            write_stub(&path);
        }
        if let Some(message) = state.evaluate_error.take() {
            return Err(ExportError::Driver(anyhow::anyhow!(message)));
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.record(Action::Screenshot(path.to_path_buf()));
        write_stub(path);
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok("<html><body>fake page</body></html>".to_string())
    }
}
