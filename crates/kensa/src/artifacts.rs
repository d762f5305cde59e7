//! Debug artifacts: one screenshot and one markup dump per named condition.
//!
//! Capture is best-effort. A failed screenshot or write is logged and
//! swallowed so it never masks the verification failure being reported.

use crate::driver::{BrowserSession, PageId};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest scenario id kept in file and directory names
pub const MAX_ID_CHARS: usize = 120;

/// Condition name used for the final page state
pub const LAST_CONDITION: &str = "last";

/// Replace characters outside `[A-Za-z0-9_.-]` with `_` and cap the length
#[must_use]
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_ID_CHARS)
        .collect();
    if cleaned.is_empty() {
        "scenario".to_string()
    } else {
        cleaned
    }
}

/// Artifact sink for one scenario
#[derive(Debug, Clone)]
pub struct Artifacts {
    base_dir: PathBuf,
    scenario_id: String,
    captured: Vec<String>,
}

impl Artifacts {
    /// Sink writing under `<base_dir>/<scenario_id>/`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, scenario_id: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            scenario_id: sanitize_id(scenario_id),
            captured: Vec::new(),
        }
    }

    /// Scenario output directory
    #[must_use]
    pub fn out_dir(&self) -> PathBuf {
        self.base_dir.join(&self.scenario_id)
    }

    /// Path of a file inside the scenario directory
    #[must_use]
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.out_dir().join(file_name)
    }

    /// Conditions captured so far, in order
    #[must_use]
    pub fn captured(&self) -> &[String] {
        &self.captured
    }

    /// Save `<condition>.png` and `<condition>.html` for a page
    pub async fn capture(&mut self, session: &mut dyn BrowserSession, page: &PageId, condition: &str) {
        let name = sanitize_id(condition);
        tracing::info!(scenario = %self.scenario_id, condition = %name, "capturing artifact");
        self.captured.push(name.clone());

        match session.screenshot(page).await {
            Ok(png) => write_best_effort(&self.path(&format!("{name}.png")), &png),
            Err(e) => tracing::warn!(condition = %name, error = %e, "screenshot failed"),
        }
        match session.content(page).await {
            Ok(html) => write_best_effort(&self.path(&format!("{name}.html")), html.as_bytes()),
            Err(e) => tracing::warn!(condition = %name, error = %e, "page content unavailable"),
        }
    }

    /// Capture the final page state
    pub async fn capture_last(&mut self, session: &mut dyn BrowserSession, page: &PageId) {
        self.capture(session, page, LAST_CONDITION).await;
    }
}

fn write_best_effort(path: &Path, bytes: &[u8]) {
    let result = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(path, bytes));
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "artifact write failed");
    }
}
