//! Scriptable in-memory browser session
//!
//! A [`MockApp`] renders each page as a [`MockNode`] tree and reacts to
//! navigation, clicks and input. [`MockSession`] evaluates selectors against
//! the rendered tree, so flows can be exercised end to end without Chromium.
//!
//! Click semantics follow the browser closely enough for the flows:
//! a non-forced click on a hidden, disabled or `pointer-events: none`
//! element fails, a forced click on a disabled element does nothing,
//! and clicking inside `a[target=_blank][href]` opens a new page.

mod css;
mod dom;

pub use dom::MockNode;

use crate::driver::{not_found, BrowserSession, ClickOptions, ElementInfo, PageId, Selector};
use crate::result::{KensaError, KensaResult};
use async_trait::async_trait;
use dom::Dom;

/// PNG signature returned as screenshot bytes
pub const MOCK_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

/// One open page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPage {
    /// Page id
    pub id: PageId,
    /// Current address
    pub url: String,
}

/// Interaction reported to the app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Page navigated (by `goto` or a same-tab link)
    Navigate {
        /// New address
        url: String,
    },
    /// Element with an action key clicked
    Click {
        /// Action key
        action: String,
    },
    /// Input filled
    Fill {
        /// Field key
        field: String,
        /// New value
        value: String,
    },
    /// Select option chosen
    Select {
        /// Field key
        field: String,
        /// Option value
        value: String,
    },
}

/// Page table handed to the app while it handles an event
pub struct MockWorld<'a> {
    page: PageId,
    pages: &'a mut Vec<MockPage>,
    next_id: &'a mut usize,
}

impl MockWorld<'_> {
    /// Page the event happened on
    #[must_use]
    pub fn page(&self) -> &PageId {
        &self.page
    }

    /// Current address of the event page
    #[must_use]
    pub fn url(&self) -> &str {
        self.pages
            .iter()
            .find(|p| p.id == self.page)
            .map_or("", |p| p.url.as_str())
    }

    /// Navigate the event page
    pub fn navigate(&mut self, url: impl Into<String>) {
        let page = self.page.clone();
        self.navigate_page(&page, url);
    }

    /// Navigate any open page
    pub fn navigate_page(&mut self, page: &PageId, url: impl Into<String>) {
        if let Some(p) = self.pages.iter_mut().find(|p| &p.id == page) {
            p.url = url.into();
        }
    }

    /// Open a new page (popup or tab)
    pub fn open_page(&mut self, url: impl Into<String>) -> PageId {
        open(self.pages, self.next_id, url.into())
    }

    /// Close a page
    pub fn close_page(&mut self, page: &PageId) {
        self.pages.retain(|p| &p.id != page);
    }

    /// Open pages in opening order
    #[must_use]
    pub fn pages(&self) -> &[MockPage] {
        self.pages
    }
}

fn open(pages: &mut Vec<MockPage>, next_id: &mut usize, url: String) -> PageId {
    *next_id += 1;
    let id = PageId::new(format!("page-{next_id}"));
    pages.push(MockPage {
        id: id.clone(),
        url,
    });
    id
}

/// Content simulated by a [`MockSession`]
pub trait MockApp: Send {
    /// Current markup of a page
    fn render(&mut self, page: &MockPage) -> MockNode;

    /// React to an interaction
    fn handle(&mut self, _event: &MockEvent, _world: &mut MockWorld<'_>) {}
}

/// [`BrowserSession`] over a [`MockApp`]
pub struct MockSession {
    app: Box<dyn MockApp>,
    pages: Vec<MockPage>,
    next_id: usize,
    history: Vec<String>,
    faults: usize,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("pages", &self.pages)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl MockSession {
    /// Session with one blank page
    #[must_use]
    pub fn new(app: impl MockApp + 'static) -> Self {
        let mut session = Self {
            app: Box::new(app),
            pages: Vec::new(),
            next_id: 0,
            history: Vec::new(),
            faults: 0,
        };
        open(&mut session.pages, &mut session.next_id, "about:blank".to_string());
        session
    }

    /// Actions performed so far
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Make the next `n` queries fail the way a page mid-navigation does
    pub fn fail_next_queries(&mut self, n: usize) {
        self.faults = n;
    }

    /// Open pages
    #[must_use]
    pub fn open_pages(&self) -> &[MockPage] {
        &self.pages
    }

    fn find_page(&self, page: &PageId) -> KensaResult<&MockPage> {
        self.pages
            .iter()
            .find(|p| &p.id == page)
            .ok_or_else(|| KensaError::session(format!("page {page} is closed")))
    }

    fn render(&mut self, page: &PageId) -> KensaResult<Dom> {
        let snapshot = self.find_page(page)?.clone();
        Ok(Dom::build(&self.app.render(&snapshot)))
    }

    fn dispatch(&mut self, page: &PageId, event: MockEvent) {
        let mut world = MockWorld {
            page: page.clone(),
            pages: &mut self.pages,
            next_id: &mut self.next_id,
        };
        self.app.handle(&event, &mut world);
    }

    fn resolve(&self, page: &PageId, href: &str) -> String {
        self.find_page(page)
            .ok()
            .and_then(|p| url::Url::parse(&p.url).ok())
            .and_then(|base| base.join(href).ok())
            .map_or_else(|| href.to_string(), String::from)
    }

    fn first_input(&mut self, page: &PageId, selector: &Selector) -> KensaResult<(Dom, usize)> {
        let dom = self.render(page)?;
        let idx = *dom.select(selector)?.first().ok_or_else(|| not_found(selector))?;
        if !dom.visible(idx) {
            return Err(KensaError::session(format!("element not visible: {selector}")));
        }
        Ok((dom, idx))
    }
}

fn field_key(dom: &Dom, idx: usize) -> String {
    dom.field(idx)
        .or_else(|| dom.attr(idx, "name"))
        .or_else(|| dom.attr(idx, "id"))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl BrowserSession for MockSession {
    fn main_page(&self) -> PageId {
        PageId::new("page-1")
    }

    async fn goto(&mut self, page: &PageId, url: &str) -> KensaResult<()> {
        self.history.push(format!("goto {page} {url}"));
        self.find_page(page)?;
        if let Some(p) = self.pages.iter_mut().find(|p| &p.id == page) {
            p.url = url.to_string();
        }
        self.dispatch(
            page,
            MockEvent::Navigate {
                url: url.to_string(),
            },
        );
        Ok(())
    }

    async fn pages(&mut self) -> KensaResult<Vec<PageId>> {
        Ok(self.pages.iter().map(|p| p.id.clone()).collect())
    }

    async fn url(&mut self, page: &PageId) -> KensaResult<String> {
        Ok(self.find_page(page)?.url.clone())
    }

    async fn query(&mut self, page: &PageId, selector: &Selector) -> KensaResult<Vec<ElementInfo>> {
        if self.faults > 0 {
            self.faults -= 1;
            return Err(KensaError::session("Execution context was destroyed"));
        }
        let dom = self.render(page)?;
        Ok(dom.select(selector)?.into_iter().map(|i| dom.info(i)).collect())
    }

    async fn click(
        &mut self,
        page: &PageId,
        selector: &Selector,
        options: ClickOptions,
    ) -> KensaResult<()> {
        self.history.push(format!("click {page} {selector}"));
        let dom = self.render(page)?;
        let idx = *dom.select(selector)?.first().ok_or_else(|| not_found(selector))?;
        let info = dom.info(idx);
        let actionable = info.visible && info.enabled && !info.pointer_events_none;
        if !options.force && !actionable {
            return Err(KensaError::session(format!(
                "element not actionable: {selector}"
            )));
        }
        if !info.enabled {
            return Ok(());
        }

        let action = dom.action_for(idx).map(str::to_string);
        let anchor = dom
            .ancestors_or_self(idx)
            .into_iter()
            .find(|&i| dom.tag(i) == "a" && dom.attr(i, "href").is_some())
            .map(|i| {
                (
                    dom.attr(i, "href").unwrap_or_default().to_string(),
                    dom.attr(i, "target") == Some("_blank"),
                )
            });
        drop(dom);

        if let Some(action) = action {
            self.dispatch(page, MockEvent::Click { action });
        }
        if let Some((href, new_tab)) = anchor {
            let target = self.resolve(page, &href);
            if new_tab {
                open(&mut self.pages, &mut self.next_id, target);
            } else {
                if let Some(p) = self.pages.iter_mut().find(|p| &p.id == page) {
                    p.url = target.clone();
                }
                self.dispatch(page, MockEvent::Navigate { url: target });
            }
        }
        Ok(())
    }

    async fn fill(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()> {
        self.history.push(format!("fill {page} {selector}"));
        let (dom, idx) = self.first_input(page, selector)?;
        if !matches!(dom.tag(idx), "input" | "textarea") {
            return Err(KensaError::session(format!(
                "element is not fillable: {selector}"
            )));
        }
        let field = field_key(&dom, idx);
        self.dispatch(
            page,
            MockEvent::Fill {
                field,
                value: value.to_string(),
            },
        );
        Ok(())
    }

    async fn select_option(
        &mut self,
        page: &PageId,
        selector: &Selector,
        value: &str,
    ) -> KensaResult<()> {
        self.history.push(format!("select {page} {selector} {value}"));
        let (dom, idx) = self.first_input(page, selector)?;
        if dom.tag(idx) != "select" {
            return Err(KensaError::session(format!("element is not a select: {selector}")));
        }
        let has_option = dom.children_of(idx).iter().any(|&o| {
            dom.tag(o) == "option"
                && (dom.attr(o, "value") == Some(value) || dom.text(o) == value)
        });
        if !has_option {
            return Err(KensaError::session(format!(
                "no option '{value}' in {selector}"
            )));
        }
        let field = field_key(&dom, idx);
        self.dispatch(
            page,
            MockEvent::Select {
                field,
                value: value.to_string(),
            },
        );
        Ok(())
    }

    async fn bring_to_front(&mut self, page: &PageId) -> KensaResult<()> {
        self.find_page(page)?;
        Ok(())
    }

    async fn close_page(&mut self, page: &PageId) -> KensaResult<()> {
        self.history.push(format!("close {page}"));
        self.find_page(page)?;
        self.pages.retain(|p| &p.id != page);
        Ok(())
    }

    async fn screenshot(&mut self, page: &PageId) -> KensaResult<Vec<u8>> {
        self.find_page(page)?;
        Ok(MOCK_PNG.to_vec())
    }

    async fn content(&mut self, page: &PageId) -> KensaResult<String> {
        Ok(self.render(page)?.to_html())
    }
}
