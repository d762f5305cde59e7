//! Browser session contract
//!
//! Flows talk to the browser only through [`BrowserSession`]. Elements are
//! addressed by [`Selector`] values rather than live handles, so every probe
//! re-resolves against the current DOM and a re-render never leaves a stale
//! reference behind.

use crate::result::{KensaError, KensaResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// PAGES
// =============================================================================

/// Identifier of an open page (tab or popup) within one session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub String);

impl PageId {
    /// Create a page id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// SELECTORS
// =============================================================================

/// Structural element query
///
/// Selectors compose: `Selector::css("div.card").has_text("結果A").parent(1)`
/// resolves the card containing the text and then walks one level up.
/// Results are always in document order without duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Standard CSS selector list
    Css {
        /// Selector text
        css: String,
    },
    /// Innermost elements whose normalized text matches
    Text {
        /// Text to match
        text: String,
        /// Whole-text equality instead of substring
        exact: bool,
    },
    /// Elements of `base` whose text contains `text`
    HasText {
        /// Candidates
        base: Box<Selector>,
        /// Required substring
        text: String,
    },
    /// Elements of `base` with a (child or descendant) match of `inner`
    Has {
        /// Candidates
        base: Box<Selector>,
        /// Required inner match
        inner: Box<Selector>,
        /// Only direct children count
        direct: bool,
    },
    /// Matches of `inner` inside any match of `scope`
    Within {
        /// Scope elements
        scope: Box<Selector>,
        /// Query evaluated inside each scope element
        inner: Box<Selector>,
    },
    /// The n-th match of `base`
    Nth {
        /// Candidates
        base: Box<Selector>,
        /// Zero-based index
        index: usize,
    },
    /// Ancestors `levels` above each match of `base`
    Parent {
        /// Candidates
        base: Box<Selector>,
        /// Levels to climb
        levels: usize,
    },
    /// Matches of `inner` inside the document of a matched iframe
    Frame {
        /// Iframe elements
        frame: Box<Selector>,
        /// Query evaluated inside the frame document
        inner: Box<Selector>,
    },
    /// Union of several selectors
    Any {
        /// Alternatives
        options: Vec<Selector>,
    },
}

impl Selector {
    /// CSS selector
    #[must_use]
    pub fn css(css: impl Into<String>) -> Self {
        Self::Css { css: css.into() }
    }

    /// Elements whose text contains `text`
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: false,
        }
    }

    /// Elements whose whole text equals `text`
    #[must_use]
    pub fn exact_text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: true,
        }
    }

    /// Union of alternatives
    #[must_use]
    pub fn any(options: impl IntoIterator<Item = Selector>) -> Self {
        Self::Any {
            options: options.into_iter().collect(),
        }
    }

    /// Keep matches whose text contains `text`
    #[must_use]
    pub fn has_text(self, text: impl Into<String>) -> Self {
        Self::HasText {
            base: Box::new(self),
            text: text.into(),
        }
    }

    /// Keep matches with a descendant matching `inner`
    #[must_use]
    pub fn has(self, inner: Selector) -> Self {
        Self::Has {
            base: Box::new(self),
            inner: Box::new(inner),
            direct: false,
        }
    }

    /// Keep matches with a direct child matching `inner`
    #[must_use]
    pub fn has_child(self, inner: Selector) -> Self {
        Self::Has {
            base: Box::new(self),
            inner: Box::new(inner),
            direct: true,
        }
    }

    /// Query `inner` inside each match
    #[must_use]
    pub fn find(self, inner: Selector) -> Self {
        Self::Within {
            scope: Box::new(self),
            inner: Box::new(inner),
        }
    }

    /// The n-th match
    #[must_use]
    pub fn nth(self, index: usize) -> Self {
        Self::Nth {
            base: Box::new(self),
            index,
        }
    }

    /// The first match
    #[must_use]
    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Ancestor `levels` above each match
    #[must_use]
    pub fn parent(self, levels: usize) -> Self {
        Self::Parent {
            base: Box::new(self),
            levels,
        }
    }

    /// Query `inner` inside the frame document of each match
    #[must_use]
    pub fn frame(self, inner: Selector) -> Self {
        Self::Frame {
            frame: Box::new(self),
            inner: Box::new(inner),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { css } => write!(f, "{css}"),
            Self::Text { text, exact: true } => write!(f, "text=\"{text}\""),
            Self::Text { text, exact: false } => write!(f, "text={text}"),
            Self::HasText { base, text } => write!(f, "{base}:has-text('{text}')"),
            Self::Has {
                base,
                inner,
                direct: true,
            } => write!(f, "{base}:has(> {inner})"),
            Self::Has { base, inner, .. } => write!(f, "{base}:has({inner})"),
            Self::Within { scope, inner } => write!(f, "{scope} >> {inner}"),
            Self::Nth { base, index } => write!(f, "{base} >> nth={index}"),
            Self::Parent { base, levels } => write!(f, "{base} >> parent={levels}"),
            Self::Frame { frame, inner } => write!(f, "{frame} >> frame >> {inner}"),
            Self::Any { options } => {
                let parts: Vec<String> = options.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" | "))
            }
        }
    }
}

// =============================================================================
// ELEMENT SNAPSHOTS
// =============================================================================

/// Point-in-time view of one matched element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Lowercase tag name
    pub tag: String,
    /// Normalized text content
    pub text: String,
    /// Attributes
    pub attrs: BTreeMap<String, String>,
    /// Rendered and not hidden
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
    /// Checked state for checkbox and radio inputs
    pub checked: bool,
    /// Computed `pointer-events: none`
    pub pointer_events_none: bool,
}

impl ElementInfo {
    /// Attribute value, if present
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Trimmed attribute value, empty when absent
    #[must_use]
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).map_or("", str::trim)
    }
}

/// Options for element clicks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Skip visibility and enabled checks
    pub force: bool,
}

impl ClickOptions {
    /// Forced click
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true }
    }
}

// =============================================================================
// SESSION TRAIT
// =============================================================================

/// One exclusively owned browser session (context) per scenario run
#[async_trait]
pub trait BrowserSession: Send {
    /// The page the session opened with
    fn main_page(&self) -> PageId;

    /// Navigate a page and wait for DOM content
    async fn goto(&mut self, page: &PageId, url: &str) -> KensaResult<()>;

    /// All open pages in opening order
    async fn pages(&mut self) -> KensaResult<Vec<PageId>>;

    /// Current address of a page
    async fn url(&mut self, page: &PageId) -> KensaResult<String>;

    /// Snapshot every element matching a selector
    async fn query(&mut self, page: &PageId, selector: &Selector) -> KensaResult<Vec<ElementInfo>>;

    /// Number of matching elements
    async fn count(&mut self, page: &PageId, selector: &Selector) -> KensaResult<usize> {
        Ok(self.query(page, selector).await?.len())
    }

    /// Click the first match
    async fn click(
        &mut self,
        page: &PageId,
        selector: &Selector,
        options: ClickOptions,
    ) -> KensaResult<()>;

    /// Replace the value of the first matching input
    async fn fill(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()>;

    /// Choose an option by value on the first matching select
    async fn select_option(
        &mut self,
        page: &PageId,
        selector: &Selector,
        value: &str,
    ) -> KensaResult<()>;

    /// Raise a page to the foreground
    async fn bring_to_front(&mut self, page: &PageId) -> KensaResult<()>;

    /// Close a page
    async fn close_page(&mut self, page: &PageId) -> KensaResult<()>;

    /// Full-page PNG screenshot
    async fn screenshot(&mut self, page: &PageId) -> KensaResult<Vec<u8>>;

    /// Full markup of the page
    async fn content(&mut self, page: &PageId) -> KensaResult<String>;

    /// Release the browser
    async fn close(&mut self) -> KensaResult<()> {
        Ok(())
    }
}

/// Whether any match is visible
pub async fn is_visible(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
) -> KensaResult<bool> {
    Ok(session.query(page, selector).await?.iter().any(|e| e.visible))
}

/// Snapshot of the first match, if any
pub async fn first(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
) -> KensaResult<Option<ElementInfo>> {
    Ok(session.query(page, selector).await?.into_iter().next())
}

/// Error for an action whose selector matched nothing
#[must_use]
pub fn not_found(selector: &Selector) -> KensaError {
    KensaError::ElementNotFound {
        selector: selector.to_string(),
    }
}
