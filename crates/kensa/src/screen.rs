//! Screen-state detection
//!
//! A [`Screen`] is a named conjunction of [`Probe`]s. Detection checks a list
//! of screens in priority order and reports the first one whose probes all
//! hold. Waiting repeats detection at a fixed interval until the budget runs
//! out, so "not yet visible" is never reported as "absent" early.

use crate::driver::{is_visible, BrowserSession, PageId, Selector};
use crate::result::{KensaError, KensaResult};
use std::time::Duration;
use tokio::time::{sleep, Instant};

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Budget and interval for a polling wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Total budget
    pub timeout: Duration,
    /// Interval between probes
    pub poll: Duration,
}

impl WaitOptions {
    /// Create wait options
    #[must_use]
    pub const fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }

    /// Same interval, different budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Budget in milliseconds, for error reporting
    #[must_use]
    pub const fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

// =============================================================================
// SIGNATURES
// =============================================================================

/// One detection strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Some match is visible
    Visible(Selector),
    /// Some match exists, visible or not
    Attached(Selector),
    /// No match is visible
    Absent(Selector),
}

impl Probe {
    /// Visible text marker
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Visible(Selector::text(text))
    }

    /// Visible element
    #[must_use]
    pub fn css(css: &str) -> Self {
        Self::Visible(Selector::css(css))
    }

    /// Visible element carrying a text
    #[must_use]
    pub fn css_with_text(css: &str, text: &str) -> Self {
        Self::Visible(Selector::css(css).has_text(text))
    }

    /// Visible element inside a frame document
    #[must_use]
    pub fn in_frame(frame: &str, inner: Selector) -> Self {
        Self::Visible(Selector::css(frame).frame(inner))
    }

    async fn holds(&self, session: &mut dyn BrowserSession, page: &PageId) -> KensaResult<bool> {
        match self {
            Self::Visible(sel) => is_visible(session, page, sel).await,
            Self::Attached(sel) => Ok(session.count(page, sel).await? > 0),
            Self::Absent(sel) => Ok(!is_visible(session, page, sel).await?),
        }
    }
}

/// Named screen signature; every probe must hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// Screen name reported by detection
    pub name: &'static str,
    /// Conjunction of probes
    pub probes: Vec<Probe>,
}

impl Screen {
    /// Screen recognised by a single probe
    #[must_use]
    pub fn new(name: &'static str, probe: Probe) -> Self {
        Self {
            name,
            probes: vec![probe],
        }
    }

    /// Screen recognised by several probes together
    #[must_use]
    pub fn all(name: &'static str, probes: impl IntoIterator<Item = Probe>) -> Self {
        Self {
            name,
            probes: probes.into_iter().collect(),
        }
    }

    /// Whether every probe holds on a page now
    pub async fn matches(&self, session: &mut dyn BrowserSession, page: &PageId) -> KensaResult<bool> {
        for probe in &self.probes {
            if !probe.holds(session, page).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// =============================================================================
// DETECTION
// =============================================================================

/// A failed poll counts as "not matched yet", except for configuration
/// errors such as an invalid selector
fn settle<T>(result: KensaResult<T>, pending: T) -> KensaResult<T> {
    match result {
        Err(e) if !e.is_configuration() => {
            tracing::debug!(error = %e, "poll failed, retrying");
            Ok(pending)
        }
        other => other,
    }
}

/// First screen (in priority order) that matches the page now
pub async fn detect(
    session: &mut dyn BrowserSession,
    page: &PageId,
    screens: &[Screen],
) -> KensaResult<Option<&'static str>> {
    for screen in screens {
        if screen.matches(session, page).await? {
            return Ok(Some(screen.name));
        }
    }
    Ok(None)
}

/// Poll [`detect`] until a screen matches or the budget is spent
pub async fn wait_for(
    session: &mut dyn BrowserSession,
    page: &PageId,
    screens: &[Screen],
    options: WaitOptions,
) -> KensaResult<Option<&'static str>> {
    let start = Instant::now();
    loop {
        if let Some(name) = settle(detect(session, page, screens).await, None)? {
            tracing::debug!(screen = name, elapsed_ms = start.elapsed().as_millis() as u64, "screen detected");
            return Ok(Some(name));
        }
        if start.elapsed() >= options.timeout {
            return Ok(None);
        }
        sleep(options.poll).await;
    }
}

/// Wait for one screen, failing with `condition` when it never shows
pub async fn expect_screen(
    session: &mut dyn BrowserSession,
    page: &PageId,
    screen: &Screen,
    options: WaitOptions,
    condition: &str,
) -> KensaResult<()> {
    match wait_for(session, page, std::slice::from_ref(screen), options).await? {
        Some(_) => Ok(()),
        None => Err(KensaError::mismatch(condition)),
    }
}

/// Screen-major search over every open page whose address is not excluded
///
/// For each screen in priority order, every page is probed before moving to
/// the next screen. Pages that close mid-probe are ignored.
pub async fn detect_across_pages(
    session: &mut dyn BrowserSession,
    screens: &[Screen],
    exclude: &(dyn Fn(&str) -> bool + Sync),
) -> KensaResult<Option<(PageId, &'static str)>> {
    let mut candidates = Vec::new();
    for page in session.pages().await? {
        match session.url(&page).await {
            Ok(url) if !exclude(&url) => candidates.push(page),
            _ => {}
        }
    }
    for screen in screens {
        for page in &candidates {
            match screen.matches(session, page).await {
                Ok(true) => return Ok(Some((page.clone(), screen.name))),
                Ok(false) => {}
                Err(e) => tracing::debug!(page = %page, error = %e, "page probe failed"),
            }
        }
    }
    Ok(None)
}

/// Poll [`detect_across_pages`] until a match or the budget is spent
pub async fn wait_across_pages(
    session: &mut dyn BrowserSession,
    screens: &[Screen],
    exclude: &(dyn Fn(&str) -> bool + Sync),
    options: WaitOptions,
) -> KensaResult<Option<(PageId, &'static str)>> {
    let start = Instant::now();
    loop {
        if let Some(hit) = settle(detect_across_pages(session, screens, exclude).await, None)? {
            return Ok(Some(hit));
        }
        if start.elapsed() >= options.timeout {
            return Ok(None);
        }
        sleep(options.poll).await;
    }
}

/// Wait until some match of a selector is visible
pub async fn wait_visible(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
    options: WaitOptions,
) -> KensaResult<bool> {
    let start = Instant::now();
    loop {
        if settle(is_visible(session, page, selector).await, false)? {
            return Ok(true);
        }
        if start.elapsed() >= options.timeout {
            return Ok(false);
        }
        sleep(options.poll).await;
    }
}

/// Wait until no match of a selector is visible
pub async fn wait_hidden(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
    options: WaitOptions,
) -> KensaResult<bool> {
    let start = Instant::now();
    loop {
        if !settle(is_visible(session, page, selector).await, true)? {
            return Ok(true);
        }
        if start.elapsed() >= options.timeout {
            return Ok(false);
        }
        sleep(options.poll).await;
    }
}

/// Wait until the selector matches at least `n` elements
pub async fn wait_count_at_least(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
    n: usize,
    options: WaitOptions,
) -> KensaResult<usize> {
    let start = Instant::now();
    loop {
        let count = settle(session.count(page, selector).await, 0)?;
        if count >= n || start.elapsed() >= options.timeout {
            return Ok(count);
        }
        sleep(options.poll).await;
    }
}

/// Wait until the first match carries a non-empty attribute value different
/// from `previous`; returns the new value
pub async fn wait_attr_change(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
    attr: &str,
    previous: &str,
    options: WaitOptions,
) -> KensaResult<Option<String>> {
    let start = Instant::now();
    loop {
        let current = settle(session.query(page, selector).await, Vec::new())?
            .first()
            .map(|e| e.attr_or_empty(attr).to_string())
            .unwrap_or_default();
        if !current.is_empty() && current != previous {
            return Ok(Some(current));
        }
        if start.elapsed() >= options.timeout {
            return Ok(None);
        }
        sleep(options.poll).await;
    }
}
