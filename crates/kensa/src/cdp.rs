//! Chromium session over the Chrome `DevTools` Protocol.
//!
//! Each session launches its own browser with a fresh profile directory, so
//! scenarios never share cookies or storage. Selectors are resolved by a
//! small script evaluated in the page; actions on elements (click, fill,
//! select) run in the same script so iframes created by embed snippets are
//! reachable through their content document.

use crate::driver::{BrowserSession, ClickOptions, ElementInfo, PageId, Selector};
use crate::result::{KensaError, KensaResult};
use crate::runner::SessionFactory;
use crate::scenario::Scenario;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Launch options
#[derive(Debug, Clone)]
pub struct CdpOptions {
    /// Run without a window
    pub headless: bool,
    /// Chromium binary (None = auto-detect)
    pub chrome_path: Option<PathBuf>,
    /// Parent directory for per-session profiles (None = system temp)
    pub profile_dir: Option<PathBuf>,
    /// Navigation budget
    pub navigation_timeout: Duration,
    /// Delay before each page action
    pub slow_mo: Duration,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for CdpOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            profile_dir: None,
            navigation_timeout: Duration::from_secs(45),
            slow_mo: Duration::ZERO,
            viewport_width: 1280,
            viewport_height: 900,
            sandbox: true,
        }
    }
}

impl CdpOptions {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the chromium binary
    #[must_use]
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Set the profile parent directory
    #[must_use]
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }

    /// Set the navigation budget
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the per-action delay
    #[must_use]
    pub const fn with_slow_mo(mut self, delay: Duration) -> Self {
        self.slow_mo = delay;
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

// =============================================================================
// IN-PAGE RESOLVER
// =============================================================================

/// Evaluates a serialized [`Selector`] and optionally acts on the first match
const RESOLVER: &str = r"
(function (sel, op, value) {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const order = (els) => {
    const seen = Array.from(new Set(els));
    return seen.sort((a, b) => {
      if (a === b) return 0;
      return a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1;
    });
  };
  const cands = (scope) => scope.doc
    ? Array.from(scope.doc.querySelectorAll('*'))
    : order(scope.roots.flatMap((r) => Array.from(r.querySelectorAll('*'))));
  const ancestor = (el, n) => {
    let cur = el;
    for (let i = 0; i < n && cur; i++) cur = cur.parentElement;
    return cur;
  };
  const evalSel = (s, scope) => {
    switch (s.kind) {
      case 'css': {
        const roots = scope.doc ? [scope.doc] : scope.roots;
        return order(roots.flatMap((r) => Array.from(r.querySelectorAll(s.css))));
      }
      case 'text': {
        const wanted = norm(s.text);
        const hits = cands(scope).filter((el) => {
          const t = norm(el.textContent);
          return s.exact ? t === wanted : t.includes(wanted);
        });
        const set = new Set(hits);
        return hits.filter((el) => !Array.from(el.children).some((c) => set.has(c)));
      }
      case 'has_text':
        return evalSel(s.base, scope).filter((el) => norm(el.textContent).includes(norm(s.text)));
      case 'has':
        return evalSel(s.base, scope).filter((el) => {
          const inner = evalSel(s.inner, { roots: [el] });
          return s.direct ? inner.some((m) => m.parentElement === el) : inner.length > 0;
        });
      case 'within': {
        const roots = evalSel(s.scope, scope);
        return roots.length ? evalSel(s.inner, { roots }) : [];
      }
      case 'nth': {
        const base = evalSel(s.base, scope);
        return s.index < base.length ? [base[s.index]] : [];
      }
      case 'parent':
        return order(evalSel(s.base, scope).map((el) => ancestor(el, s.levels)).filter(Boolean));
      case 'frame':
        return evalSel(s.frame, scope).flatMap((f) => {
          let doc = null;
          try { doc = f.contentDocument; } catch (e) { doc = null; }
          return doc ? evalSel(s.inner, { doc }) : [];
        });
      case 'any':
        return order(s.options.flatMap((o) => evalSel(o, scope)));
      default:
        throw new Error('unknown selector kind ' + s.kind);
    }
  };
  const styleOf = (el) => (el.ownerDocument.defaultView || window).getComputedStyle(el);
  const info = (el) => {
    const style = styleOf(el);
    const attrs = {};
    for (const a of Array.from(el.attributes)) attrs[a.name] = a.value;
    return {
      tag: el.tagName.toLowerCase(),
      text: norm(el.textContent),
      attrs,
      visible: el.getClientRects().length > 0 && style.visibility !== 'hidden' && style.display !== 'none',
      enabled: !el.disabled && !el.hasAttribute('disabled'),
      checked: !!el.checked,
      pointer_events_none: style.pointerEvents === 'none',
    };
  };
  let found;
  try {
    found = evalSel(sel, { doc: document });
  } catch (e) {
    if (e instanceof DOMException && e.name === 'SyntaxError') return { error: 'invalid_selector' };
    throw e;
  }
  if (op === 'query') return { items: found.map(info) };
  const el = found[0];
  if (!el) return { error: 'not_found' };
  const state = info(el);
  if (op === 'click') {
    if (!value && (!state.visible || !state.enabled || state.pointer_events_none)) {
      return { error: 'not_actionable' };
    }
    el.scrollIntoView({ block: 'center' });
    el.click();
    return {};
  }
  if (op === 'fill') {
    if (!state.visible) return { error: 'not_actionable' };
    el.focus();
    const proto = Object.getPrototypeOf(el);
    const desc = Object.getOwnPropertyDescriptor(proto, 'value');
    if (desc && desc.set) desc.set.call(el, value); else el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return {};
  }
  if (op === 'select') {
    if (!Array.from(el.options || []).some((o) => o.value === value)) return { error: 'no_option' };
    el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return {};
  }
  return { error: 'unknown_op' };
})
";

#[derive(Debug, Default, Deserialize)]
struct ResolverReply {
    #[serde(default)]
    items: Vec<ElementInfo>,
    #[serde(default)]
    error: Option<String>,
}

fn cdp_err(e: impl std::fmt::Display) -> KensaError {
    KensaError::session(e.to_string())
}

fn script(selector: &Selector, op: &str, value: &serde_json::Value) -> KensaResult<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(format!("({RESOLVER})({sel}, {op:?}, {value})"))
}

// =============================================================================
// SESSION
// =============================================================================

/// One Chromium instance driving a single scenario
pub struct CdpSession {
    browser: Browser,
    handler: JoinHandle<()>,
    pages: Vec<(PageId, Page)>,
    main: PageId,
    options: CdpOptions,
    profile: PathBuf,
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("main", &self.main)
            .field("pages", &self.pages.len())
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

fn page_id(page: &Page) -> PageId {
    PageId::new(page.target_id().inner().clone())
}

impl CdpSession {
    /// Launch Chromium with a fresh profile and open the main page
    ///
    /// # Errors
    ///
    /// Returns a session error if the browser cannot be launched
    pub async fn launch(options: CdpOptions) -> KensaResult<Self> {
        let parent = options.profile_dir.clone().unwrap_or_else(std::env::temp_dir);
        let profile = parent.join(format!("kensa-profile-{}", uuid::Uuid::new_v4().simple()));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile)
            .window_size(options.viewport_width, options.viewport_height)
            .request_timeout(options.navigation_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if !options.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(KensaError::session)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp_err)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        let main = page_id(&page);
        tracing::info!(profile = %profile.display(), headless = options.headless, "chromium launched");
        Ok(Self {
            browser,
            handler,
            pages: vec![(main.clone(), page)],
            main,
            options,
            profile,
        })
    }

    /// Sync the page list with the browser's targets, keeping opening order
    async fn refresh(&mut self) -> KensaResult<()> {
        let live = self.browser.pages().await.map_err(cdp_err)?;
        let live: Vec<(PageId, Page)> = live.into_iter().map(|p| (page_id(&p), p)).collect();
        self.pages.retain(|(id, _)| live.iter().any(|(l, _)| l == id));
        for (id, page) in live {
            if !self.pages.iter().any(|(p, _)| *p == id) {
                tracing::debug!(page = %id, "new page discovered");
                self.pages.push((id, page));
            }
        }
        Ok(())
    }

    async fn page(&mut self, id: &PageId) -> KensaResult<Page> {
        if let Some((_, page)) = self.pages.iter().find(|(p, _)| p == id) {
            return Ok(page.clone());
        }
        self.refresh().await?;
        self.pages
            .iter()
            .find(|(p, _)| p == id)
            .map(|(_, page)| page.clone())
            .ok_or_else(|| KensaError::session(format!("page {id} is closed")))
    }

    async fn slow_mo(&mut self) {
        if !self.options.slow_mo.is_zero() {
            tokio::time::sleep(self.options.slow_mo).await;
        }
    }

    async fn resolve(
        &mut self,
        id: &PageId,
        selector: &Selector,
        op: &str,
        value: serde_json::Value,
    ) -> KensaResult<ResolverReply> {
        let page = self.page(id).await?;
        let expr = script(selector, op, &value)?;
        let reply: ResolverReply = page
            .evaluate(expr)
            .await
            .map_err(cdp_err)?
            .into_value()
            .map_err(cdp_err)?;
        match reply.error.as_deref() {
            None => Ok(reply),
            Some("not_found") => Err(crate::driver::not_found(selector)),
            Some("invalid_selector") => Err(KensaError::config(format!("invalid selector {selector}"))),
            Some(other) => Err(KensaError::session(format!("{op} on {selector}: {other}"))),
        }
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    fn main_page(&self) -> PageId {
        self.main.clone()
    }

    async fn goto(&mut self, page: &PageId, url: &str) -> KensaResult<()> {
        let target = self.page(page).await?;
        let budget = self.options.navigation_timeout;
        tracing::debug!(page = %page, url, "navigating");
        match tokio::time::timeout(budget, target.goto(url)).await {
            Ok(result) => result.map(|_| ()).map_err(cdp_err),
            Err(_) => Err(KensaError::Timeout {
                what: format!("navigation to {url}"),
                ms: budget.as_millis() as u64,
            }),
        }
    }

    async fn pages(&mut self) -> KensaResult<Vec<PageId>> {
        self.refresh().await?;
        Ok(self.pages.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn url(&mut self, page: &PageId) -> KensaResult<String> {
        let target = self.page(page).await?;
        Ok(target.url().await.map_err(cdp_err)?.unwrap_or_default())
    }

    async fn query(&mut self, page: &PageId, selector: &Selector) -> KensaResult<Vec<ElementInfo>> {
        Ok(self
            .resolve(page, selector, "query", serde_json::Value::Null)
            .await?
            .items)
    }

    async fn click(&mut self, page: &PageId, selector: &Selector, options: ClickOptions) -> KensaResult<()> {
        self.slow_mo().await;
        self.resolve(page, selector, "click", serde_json::Value::Bool(options.force))
            .await
            .map(|_| ())
    }

    async fn fill(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()> {
        self.slow_mo().await;
        self.resolve(page, selector, "fill", serde_json::Value::from(value))
            .await
            .map(|_| ())
    }

    async fn select_option(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()> {
        self.slow_mo().await;
        self.resolve(page, selector, "select", serde_json::Value::from(value))
            .await
            .map(|_| ())
    }

    async fn bring_to_front(&mut self, page: &PageId) -> KensaResult<()> {
        let target = self.page(page).await?;
        target.bring_to_front().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn close_page(&mut self, page: &PageId) -> KensaResult<()> {
        let target = self.page(page).await?;
        self.pages.retain(|(id, _)| id != page);
        target.close().await.map_err(cdp_err)
    }

    async fn screenshot(&mut self, page: &PageId) -> KensaResult<Vec<u8>> {
        use base64::Engine;

        let target = self.page(page).await?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .capture_beyond_viewport(true)
            .build();
        let shot = target.execute(params).await.map_err(cdp_err)?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(cdp_err)
    }

    async fn content(&mut self, page: &PageId) -> KensaResult<String> {
        let target = self.page(page).await?;
        target.content().await.map_err(cdp_err)
    }

    async fn close(&mut self) -> KensaResult<()> {
        let closed = self.browser.close().await.map_err(cdp_err);
        if let Err(e) = self.browser.wait().await {
            tracing::warn!(error = %e, "chromium did not exit cleanly");
        }
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.profile) {
            tracing::warn!(profile = %self.profile.display(), error = %e, "profile cleanup failed");
        }
        closed.map(|_| ())
    }
}

/// Launches one [`CdpSession`] per scenario
#[derive(Debug, Clone, Default)]
pub struct CdpSessionFactory {
    options: CdpOptions,
}

impl CdpSessionFactory {
    /// Factory with fixed launch options
    #[must_use]
    pub const fn new(options: CdpOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for CdpSessionFactory {
    async fn create(&self, scenario: &Scenario) -> KensaResult<Box<dyn BrowserSession>> {
        tracing::debug!(scenario = %scenario.id, "launching chromium");
        Ok(Box::new(CdpSession::launch(self.options.clone()).await?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_script_embeds_selector_json() {
        let sel = Selector::css("iframe").frame(Selector::exact_text("送信"));
        let expr = script(&sel, "click", &serde_json::Value::Bool(true)).unwrap();
        assert!(expr.contains(r#""kind":"frame""#));
        assert!(expr.ends_with(r#", "click", true)"#));
    }

    #[test]
    fn test_reply_defaults() {
        let reply: ResolverReply = serde_json::from_str("{}").unwrap();
        assert!(reply.items.is_empty());
        assert!(reply.error.is_none());
        let reply: ResolverReply = serde_json::from_str(r#"{"error":"not_found"}"#).unwrap();
        assert_eq!(reply.error.as_deref(), Some("not_found"));
    }

    #[test]
    fn test_options_builder() {
        let opts = CdpOptions::default()
            .with_headless(false)
            .with_slow_mo(Duration::from_millis(50))
            .with_no_sandbox();
        assert!(!opts.headless);
        assert!(!opts.sandbox);
        assert_eq!(opts.slow_mo, Duration::from_millis(50));
    }
}
