//! Per-run step recording
//!
//! Every browser action a flow performs is recorded with its elapsed time and
//! outcome. The archive is written once per run as
//! `<base>/<id>/trace_<id>_<timestamp>.json`.

use crate::artifacts::sanitize_id;
use crate::driver::{BrowserSession, ClickOptions, ElementInfo, PageId, Selector};
use crate::result::KensaResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Outcome of one recorded step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// Action succeeded
    Ok,
    /// Action failed
    Error {
        /// Error message
        message: String,
    },
}

/// One recorded browser action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Milliseconds since recording started
    pub elapsed_ms: u64,
    /// Action name (`goto`, `click`, `fill`, ...)
    pub action: String,
    /// Page the action targeted
    pub page: String,
    /// Target description (address or selector)
    pub target: String,
    /// Outcome
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Archive header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// Unique trace id
    pub trace_id: String,
    /// Scenario id
    pub scenario_id: String,
    /// Start time (RFC 3339)
    pub started_at: String,
    /// End time (RFC 3339)
    pub finished_at: Option<String>,
    /// Total duration in ms
    pub duration_ms: Option<u64>,
    /// Number of steps
    pub step_count: usize,
    /// Terminal outcome of the run
    pub outcome: Option<String>,
    /// Kensa version
    pub kensa_version: String,
}

impl TraceMetadata {
    /// Metadata for a new recording
    #[must_use]
    pub fn new(scenario_id: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            scenario_id: scenario_id.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            duration_ms: None,
            step_count: 0,
            outcome: None,
            kensa_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Complete recording of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceArchive {
    /// Header
    pub metadata: TraceMetadata,
    /// Steps in order
    pub steps: Vec<StepEvent>,
}

impl TraceArchive {
    /// Save archive to a JSON file
    pub fn save_json(&self, path: &Path) -> KensaResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }

    /// Load archive from a JSON file
    pub fn load_json(path: &Path) -> KensaResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Steps that failed
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&StepEvent> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Error { .. }))
            .collect()
    }
}

/// Collects steps for one scenario run
#[derive(Debug)]
pub struct StepRecorder {
    metadata: TraceMetadata,
    start: Instant,
    steps: Vec<StepEvent>,
    finalized: bool,
}

impl StepRecorder {
    /// Start recording
    #[must_use]
    pub fn start(scenario_id: &str) -> Self {
        Self {
            metadata: TraceMetadata::new(scenario_id),
            start: Instant::now(),
            steps: Vec::new(),
            finalized: false,
        }
    }

    /// Record one step
    pub fn record<T>(&mut self, action: &str, page: &PageId, target: &str, result: &KensaResult<T>) {
        let status = match result {
            Ok(_) => StepStatus::Ok,
            Err(e) => StepStatus::Error {
                message: e.to_string(),
            },
        };
        self.steps.push(StepEvent {
            elapsed_ms: self.start.elapsed().as_millis() as u64,
            action: action.to_string(),
            page: page.to_string(),
            target: target.to_string(),
            status,
        });
    }

    /// Steps recorded so far
    #[must_use]
    pub fn steps(&self) -> &[StepEvent] {
        &self.steps
    }

    /// Whether the archive has been written
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Close the recording and build the archive
    #[must_use]
    pub fn stop(&mut self, outcome: &str) -> TraceArchive {
        self.metadata.finished_at = Some(chrono::Utc::now().to_rfc3339());
        self.metadata.duration_ms = Some(self.start.elapsed().as_millis() as u64);
        self.metadata.step_count = self.steps.len();
        self.metadata.outcome = Some(outcome.to_string());
        TraceArchive {
            metadata: self.metadata.clone(),
            steps: self.steps.clone(),
        }
    }

    /// Write the archive under `<base>/<id>/`; only the first call writes
    pub fn finalize(&mut self, base_dir: &Path, outcome: &str) -> KensaResult<Option<PathBuf>> {
        if self.finalized {
            return Ok(None);
        }
        self.finalized = true;
        let archive = self.stop(outcome);
        let id = sanitize_id(&self.metadata.scenario_id);
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = base_dir.join(&id).join(format!("trace_{id}_{stamp}.json"));
        archive.save_json(&path)?;
        tracing::info!(path = %path.display(), steps = archive.steps.len(), "trace saved");
        Ok(Some(path))
    }
}

// =============================================================================
// RECORDING SESSION
// =============================================================================

/// Session wrapper that records every state-changing action
pub struct RecordingSession {
    inner: Box<dyn BrowserSession>,
    recorder: StepRecorder,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl RecordingSession {
    /// Wrap a session
    #[must_use]
    pub fn new(inner: Box<dyn BrowserSession>, scenario_id: &str) -> Self {
        Self {
            inner,
            recorder: StepRecorder::start(scenario_id),
        }
    }

    /// The recorder
    pub fn recorder_mut(&mut self) -> &mut StepRecorder {
        &mut self.recorder
    }
}

#[async_trait]
impl BrowserSession for RecordingSession {
    fn main_page(&self) -> PageId {
        self.inner.main_page()
    }

    async fn goto(&mut self, page: &PageId, url: &str) -> KensaResult<()> {
        let result = self.inner.goto(page, url).await;
        self.recorder.record("goto", page, url, &result);
        result
    }

    async fn pages(&mut self) -> KensaResult<Vec<PageId>> {
        self.inner.pages().await
    }

    async fn url(&mut self, page: &PageId) -> KensaResult<String> {
        self.inner.url(page).await
    }

    async fn query(&mut self, page: &PageId, selector: &Selector) -> KensaResult<Vec<ElementInfo>> {
        self.inner.query(page, selector).await
    }

    async fn click(
        &mut self,
        page: &PageId,
        selector: &Selector,
        options: ClickOptions,
    ) -> KensaResult<()> {
        let result = self.inner.click(page, selector, options).await;
        let action = if options.force { "force_click" } else { "click" };
        self.recorder.record(action, page, &selector.to_string(), &result);
        result
    }

    async fn fill(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()> {
        let result = self.inner.fill(page, selector, value).await;
        self.recorder.record("fill", page, &selector.to_string(), &result);
        result
    }

    async fn select_option(
        &mut self,
        page: &PageId,
        selector: &Selector,
        value: &str,
    ) -> KensaResult<()> {
        let result = self.inner.select_option(page, selector, value).await;
        self.recorder.record("select", page, &format!("{selector} = {value}"), &result);
        result
    }

    async fn bring_to_front(&mut self, page: &PageId) -> KensaResult<()> {
        self.inner.bring_to_front(page).await
    }

    async fn close_page(&mut self, page: &PageId) -> KensaResult<()> {
        let result = self.inner.close_page(page).await;
        self.recorder.record("close_page", page, "", &result);
        result
    }

    async fn screenshot(&mut self, page: &PageId) -> KensaResult<Vec<u8>> {
        let result = self.inner.screenshot(page).await;
        self.recorder.record("screenshot", page, "", &result);
        result
    }

    async fn content(&mut self, page: &PageId) -> KensaResult<String> {
        self.inner.content(page).await
    }

    async fn close(&mut self) -> KensaResult<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockApp, MockNode, MockPage, MockSession};
    use crate::result::KensaError;
    use tempfile::TempDir;

    struct Page;

    impl MockApp for Page {
        fn render(&mut self, _page: &MockPage) -> MockNode {
            MockNode::new("body").child(MockNode::button("go"))
        }
    }

    mod recorder_tests {
        use super::*;

        #[test]
        fn test_record_ok_and_error() {
            let mut rec = StepRecorder::start("s1");
            let page = PageId::new("page-1");
            rec.record("click", &page, "button", &Ok::<(), KensaError>(()));
            rec.record::<()>("click", &page, "nav", &Err(KensaError::session("boom")));
            let archive = rec.stop("failed");
            assert_eq!(archive.metadata.step_count, 2);
            assert_eq!(archive.failed_steps().len(), 1);
            assert_eq!(archive.metadata.outcome.as_deref(), Some("failed"));
        }

        #[test]
        fn test_finalize_writes_once() {
            let tmp = TempDir::new().unwrap();
            let mut rec = StepRecorder::start("line/3");
            let first = rec.finalize(tmp.path(), "passed").unwrap().unwrap();
            assert!(first.starts_with(tmp.path().join("line_3")));
            let name = first.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("trace_line_3_"));
            assert!(name.ends_with(".json"));
            assert!(rec.finalize(tmp.path(), "passed").unwrap().is_none());
            assert!(rec.is_finalized());

            let loaded = TraceArchive::load_json(&first).unwrap();
            assert_eq!(loaded.metadata.scenario_id, "line/3");
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn test_actions_are_recorded() {
            let mut session = RecordingSession::new(Box::new(MockSession::new(Page)), "s");
            let page = session.main_page();
            session.goto(&page, "https://example.com/").await.unwrap();
            session
                .click(&page, &Selector::text("go"), ClickOptions::default())
                .await
                .unwrap();
            let _ = session
                .click(&page, &Selector::text("missing"), ClickOptions::forced())
                .await;
            let _ = session.query(&page, &Selector::css("button")).await.unwrap();

            let steps = session.recorder_mut().steps().to_vec();
            assert_eq!(steps.len(), 3);
            assert_eq!(steps[0].action, "goto");
            assert_eq!(steps[2].action, "force_click");
            assert!(matches!(steps[2].status, StepStatus::Error { .. }));
        }
    }
}
