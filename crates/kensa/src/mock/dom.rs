//! In-memory DOM used by [`super::MockSession`]
//!
//! Apps describe a page as a [`MockNode`] tree. The tree is flattened into an
//! arena so selectors can walk parents and children by index, and frame
//! documents become separate documents hosted by their iframe element.

use super::css::{self, Combinator, Complex, SelectorList};
use crate::driver::{ElementInfo, Selector};
use crate::result::KensaResult;
use std::collections::BTreeMap;

// =============================================================================
// NODE BUILDER
// =============================================================================

/// Element description produced by a mock app
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockNode {
    /// Tag name
    pub tag: String,
    /// Attributes
    pub attrs: BTreeMap<String, String>,
    /// Own text, placed before the children
    pub text: String,
    /// Child elements
    pub children: Vec<MockNode>,
    /// Not rendered (`display: none`)
    pub hidden: bool,
    /// Action key reported to the app when clicked
    pub action: Option<String>,
    /// Field key reported to the app when filled or selected
    pub field: Option<String>,
    /// Document shown inside an iframe
    pub frame: Option<Box<MockNode>>,
}

impl MockNode {
    /// Element with a tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// `div`
    #[must_use]
    pub fn div() -> Self {
        Self::new("div")
    }

    /// `button` with a label
    #[must_use]
    pub fn button(label: impl Into<String>) -> Self {
        Self::new("button").text(label)
    }

    /// `img` with source and alt text
    #[must_use]
    pub fn img(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self::new("img").attr("src", src).attr("alt", alt)
    }

    /// `a` pointing at an address
    #[must_use]
    pub fn link(href: impl Into<String>) -> Self {
        Self::new("a").attr("href", href)
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Add classes (space separated)
    #[must_use]
    pub fn class(mut self, classes: &str) -> Self {
        let merged = match self.attrs.get("class") {
            Some(existing) if !existing.is_empty() => format!("{existing} {classes}"),
            _ => classes.to_string(),
        };
        self.attrs.insert("class".to_string(), merged);
        self
    }

    /// Set own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: MockNode) -> Self {
        self.children.push(child);
        self
    }

    /// Append children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = MockNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Mark as not rendered
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Set or clear the `disabled` attribute
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        if disabled {
            self.attrs.insert("disabled".to_string(), String::new());
        } else {
            self.attrs.remove("disabled");
        }
        self
    }

    /// Set or clear the `checked` attribute
    #[must_use]
    pub fn checked(mut self, checked: bool) -> Self {
        if checked {
            self.attrs.insert("checked".to_string(), String::new());
        } else {
            self.attrs.remove("checked");
        }
        self
    }

    /// Report clicks to the app under this key
    #[must_use]
    pub fn on_click(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Report fills and selections to the app under this key
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Document shown inside this iframe
    #[must_use]
    pub fn frame_doc(mut self, doc: MockNode) -> Self {
        self.frame = Some(Box::new(doc));
        self
    }
}

// =============================================================================
// ARENA
// =============================================================================

#[derive(Debug)]
struct Flat {
    tag: String,
    attrs: BTreeMap<String, String>,
    own_text: String,
    parent: Option<usize>,
    children: Vec<usize>,
    doc: usize,
    hidden: bool,
    action: Option<String>,
    field: Option<String>,
    frame_root: Option<usize>,
}

/// Flattened render of one page
#[derive(Debug)]
pub(crate) struct Dom {
    nodes: Vec<Flat>,
    /// Iframe element hosting each document (`None` for the top document)
    hosts: Vec<Option<usize>>,
}

#[derive(Debug, Clone)]
enum Scope {
    Doc(usize),
    Under(Vec<usize>),
}

impl Dom {
    pub(crate) fn build(root: &MockNode) -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            hosts: vec![None],
        };
        dom.push(root, None, 0);
        dom
    }

    fn push(&mut self, node: &MockNode, parent: Option<usize>, doc: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Flat {
            tag: node.tag.to_lowercase(),
            attrs: node.attrs.clone(),
            own_text: node.text.clone(),
            parent,
            children: Vec::new(),
            doc,
            hidden: node.hidden,
            action: node.action.clone(),
            field: node.field.clone(),
            frame_root: None,
        });
        if let Some(frame) = &node.frame {
            let frame_doc = self.hosts.len();
            self.hosts.push(Some(idx));
            let root = self.push(frame, None, frame_doc);
            self.nodes[idx].frame_root = Some(root);
        }
        for child in &node.children {
            let c = self.push(child, Some(idx), doc);
            self.nodes[idx].children.push(c);
        }
        idx
    }

    // -------------------------------------------------------------------------
    // Element properties
    // -------------------------------------------------------------------------

    fn raw_text(&self, idx: usize, out: &mut String) {
        out.push_str(&self.nodes[idx].own_text);
        for &c in &self.nodes[idx].children {
            self.raw_text(c, out);
        }
    }

    pub(crate) fn text(&self, idx: usize) -> String {
        let mut raw = String::new();
        self.raw_text(idx, &mut raw);
        normalize(&raw)
    }

    pub(crate) fn visible(&self, idx: usize) -> bool {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            if node.hidden {
                return false;
            }
            cursor = match node.parent {
                Some(p) => Some(p),
                None => self.hosts[node.doc],
            };
        }
        true
    }

    pub(crate) fn info(&self, idx: usize) -> ElementInfo {
        let node = &self.nodes[idx];
        let style = node.attrs.get("style").map_or("", String::as_str);
        ElementInfo {
            tag: node.tag.clone(),
            text: self.text(idx),
            attrs: node.attrs.clone(),
            visible: self.visible(idx),
            enabled: !node.attrs.contains_key("disabled"),
            checked: node.attrs.contains_key("checked"),
            pointer_events_none: style.replace(' ', "").contains("pointer-events:none"),
        }
    }

    pub(crate) fn tag(&self, idx: usize) -> &str {
        &self.nodes[idx].tag
    }

    pub(crate) fn attr(&self, idx: usize, name: &str) -> Option<&str> {
        self.nodes[idx].attrs.get(name).map(String::as_str)
    }

    pub(crate) fn field(&self, idx: usize) -> Option<&str> {
        self.nodes[idx].field.as_deref()
    }

    pub(crate) fn children_of(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].children
    }

    /// Self and ancestors within the same document, nearest first
    pub(crate) fn ancestors_or_self(&self, idx: usize) -> Vec<usize> {
        let mut out = vec![idx];
        let mut cursor = self.nodes[idx].parent;
        while let Some(p) = cursor {
            out.push(p);
            cursor = self.nodes[p].parent;
        }
        out
    }

    /// Nearest action key on the element or its ancestors
    pub(crate) fn action_for(&self, idx: usize) -> Option<&str> {
        self.ancestors_or_self(idx)
            .into_iter()
            .find_map(|i| self.nodes[i].action.as_deref())
    }

    // -------------------------------------------------------------------------
    // Selector evaluation
    // -------------------------------------------------------------------------

    /// Indices of every match in document order
    pub(crate) fn select(&self, selector: &Selector) -> KensaResult<Vec<usize>> {
        self.eval(selector, &Scope::Doc(0))
    }

    fn candidates(&self, scope: &Scope) -> Vec<usize> {
        match scope {
            Scope::Doc(doc) => (0..self.nodes.len())
                .filter(|&i| self.nodes[i].doc == *doc)
                .collect(),
            Scope::Under(roots) => {
                let mut out = Vec::new();
                for &r in roots {
                    self.descendants(r, &mut out);
                }
                sorted_unique(out)
            }
        }
    }

    fn descendants(&self, idx: usize, out: &mut Vec<usize>) {
        for &c in &self.nodes[idx].children {
            out.push(c);
            self.descendants(c, out);
        }
    }

    fn eval(&self, selector: &Selector, scope: &Scope) -> KensaResult<Vec<usize>> {
        let found = match selector {
            Selector::Css { css } => {
                let list = css::parse(css)?;
                self.candidates(scope)
                    .into_iter()
                    .filter(|&i| self.matches_list(&list, i))
                    .collect()
            }
            Selector::Text { text, exact } => {
                let wanted = normalize(text);
                let hits: Vec<usize> = self
                    .candidates(scope)
                    .into_iter()
                    .filter(|&i| text_matches(&self.text(i), &wanted, *exact))
                    .collect();
                hits.iter()
                    .copied()
                    .filter(|&i| {
                        !self.nodes[i]
                            .children
                            .iter()
                            .any(|c| hits.contains(c))
                    })
                    .collect()
            }
            Selector::HasText { base, text } => {
                let wanted = normalize(text);
                self.eval(base, scope)?
                    .into_iter()
                    .filter(|&i| text_matches(&self.text(i), &wanted, false))
                    .collect()
            }
            Selector::Has {
                base,
                inner,
                direct,
            } => {
                let mut out = Vec::new();
                for b in self.eval(base, scope)? {
                    let inner_hits = self.eval(inner, &Scope::Under(vec![b]))?;
                    let ok = if *direct {
                        inner_hits.iter().any(|&m| self.nodes[m].parent == Some(b))
                    } else {
                        !inner_hits.is_empty()
                    };
                    if ok {
                        out.push(b);
                    }
                }
                out
            }
            Selector::Within { scope: outer, inner } => {
                let roots = self.eval(outer, scope)?;
                if roots.is_empty() {
                    Vec::new()
                } else {
                    self.eval(inner, &Scope::Under(roots))?
                }
            }
            Selector::Nth { base, index } => self
                .eval(base, scope)?
                .get(*index)
                .copied()
                .into_iter()
                .collect(),
            Selector::Parent { base, levels } => {
                let mut out = Vec::new();
                for b in self.eval(base, scope)? {
                    let chain = self.ancestors_or_self(b);
                    if let Some(&a) = chain.get(*levels) {
                        out.push(a);
                    }
                }
                out
            }
            Selector::Frame { frame, inner } => {
                let mut out = Vec::new();
                for f in self.eval(frame, scope)? {
                    if let Some(root) = self.nodes[f].frame_root {
                        out.extend(self.eval(inner, &Scope::Doc(self.nodes[root].doc))?);
                    }
                }
                out
            }
            Selector::Any { options } => {
                let mut out = Vec::new();
                for option in options {
                    out.extend(self.eval(option, scope)?);
                }
                out
            }
        };
        Ok(sorted_unique(found))
    }

    fn matches_list(&self, list: &SelectorList, idx: usize) -> bool {
        list.0.iter().any(|complex| self.matches_complex(complex, idx))
    }

    fn matches_complex(&self, complex: &Complex, idx: usize) -> bool {
        self.matches_from(complex, 0, idx)
    }

    fn matches_from(&self, complex: &Complex, part: usize, idx: usize) -> bool {
        let (compound, combinator) = &complex.parts[part];
        let node = &self.nodes[idx];
        if !compound.matches(&node.tag, &node.attrs) {
            return false;
        }
        match combinator {
            None => true,
            Some(Combinator::Child) => node
                .parent
                .is_some_and(|p| self.matches_from(complex, part + 1, p)),
            Some(Combinator::Descendant) => {
                let mut cursor = node.parent;
                while let Some(p) = cursor {
                    if self.matches_from(complex, part + 1, p) {
                        return true;
                    }
                    cursor = self.nodes[p].parent;
                }
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Markup of the top document
    pub(crate) fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        if !self.nodes.is_empty() {
            self.write_html(0, &mut out);
        }
        out
    }

    fn write_html(&self, idx: usize, out: &mut String) {
        let node = &self.nodes[idx];
        out.push('<');
        out.push_str(&node.tag);
        for (k, v) in &node.attrs {
            if v.is_empty() {
                out.push_str(&format!(" {k}"));
            } else {
                out.push_str(&format!(" {k}=\"{}\"", v.replace('"', "&quot;")));
            }
        }
        if node.hidden {
            out.push_str(" hidden");
        }
        out.push('>');
        out.push_str(&escape(&node.own_text));
        for &c in &node.children {
            self.write_html(c, out);
        }
        out.push_str(&format!("</{}>", node.tag));
    }
}

fn sorted_unique(mut v: Vec<usize>) -> Vec<usize> {
    v.sort_unstable();
    v.dedup();
    v
}

/// Collapse whitespace runs (including ideographic spaces) and trim
pub(crate) fn normalize(text: &str) -> String {
    text.split(|c: char| c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn text_matches(haystack: &str, needle: &str, exact: bool) -> bool {
    if exact {
        haystack == needle
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
