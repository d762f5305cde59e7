//! Minimal CSS selector parser for the in-memory DOM.
//!
//! Supports type, class, id and attribute (`=`, `^=`, `*=`, `$=`, presence)
//! conditions joined by descendant and child combinators, and comma lists.

use crate::result::{KensaError, KensaResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Contains,
    Suffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrCond {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrCond {
    fn matches(&self, attrs: &BTreeMap<String, String>) -> bool {
        let Some(actual) = attrs.get(&self.name) else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == &self.value,
            AttrOp::Prefix => actual.starts_with(&self.value),
            AttrOp::Contains => actual.contains(&self.value),
            AttrOp::Suffix => actual.ends_with(&self.value),
        }
    }
}

/// Conditions on a single element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCond>,
}

impl Compound {
    pub(crate) fn matches(&self, tag: &str, attrs: &BTreeMap<String, String>) -> bool {
        if let Some(t) = &self.tag {
            if t != "*" && !t.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if attrs.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = attrs.get("class").map_or("", String::as_str);
            let have: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|c| have.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|a| a.matches(attrs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
}

/// Compounds right-to-left: `(compound, combinator to the next one on the left)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Complex {
    pub(crate) parts: Vec<(Compound, Option<Combinator>)>,
}

/// Comma-separated alternatives
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorList(pub(crate) Vec<Complex>);

pub(crate) fn parse(input: &str) -> KensaResult<SelectorList> {
    let mut list = Vec::new();
    for part in split_top_level(input, ',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid(input, "empty selector in list"));
        }
        list.push(parse_complex(part).map_err(|m| invalid(input, &m))?);
    }
    Ok(SelectorList(list))
}

fn invalid(input: &str, message: &str) -> KensaError {
    KensaError::config(format!("invalid css selector '{input}': {message}"))
}

fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in input.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
                continue;
            }
            None => {}
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' | '(' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c == sep && depth == 0 => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

fn parse_complex(input: &str) -> Result<Complex, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut left_to_right: Vec<(Compound, Option<Combinator>)> = Vec::new();
    let mut pending: Option<Combinator> = None;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if !left_to_right.is_empty() && pending.is_none() {
                pending = Some(Combinator::Descendant);
            }
            i += 1;
            continue;
        }
        if c == '>' {
            if left_to_right.is_empty() {
                return Err("leading combinator".to_string());
            }
            pending = Some(Combinator::Child);
            i += 1;
            continue;
        }
        let (compound, next) = parse_compound(&chars, i)?;
        left_to_right.push((compound, pending.take()));
        i = next;
    }
    if pending == Some(Combinator::Child) || left_to_right.is_empty() {
        return Err("dangling combinator".to_string());
    }

    // Store right-to-left with each compound's combinator toward its left neighbour.
    let mut parts = Vec::with_capacity(left_to_right.len());
    for idx in (0..left_to_right.len()).rev() {
        let combinator = if idx == 0 {
            None
        } else {
            left_to_right[idx].1
        };
        parts.push((left_to_right[idx].0.clone(), combinator));
    }
    Ok(Complex { parts })
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let start = i;
    while i < chars.len() && is_ident(chars[i]) {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

fn parse_compound(chars: &[char], mut i: usize) -> Result<(Compound, usize), String> {
    let mut compound = Compound::default();
    if chars[i] == '*' {
        compound.tag = Some("*".to_string());
        i += 1;
    } else if is_ident(chars[i]) {
        let (tag, next) = read_ident(chars, i);
        compound.tag = Some(tag.to_lowercase());
        i = next;
    }
    while i < chars.len() {
        match chars[i] {
            '.' => {
                let (class, next) = read_ident(chars, i + 1);
                if class.is_empty() {
                    return Err("empty class".to_string());
                }
                compound.classes.push(class);
                i = next;
            }
            '#' => {
                let (id, next) = read_ident(chars, i + 1);
                if id.is_empty() {
                    return Err("empty id".to_string());
                }
                compound.id = Some(id);
                i = next;
            }
            '[' => {
                let (cond, next) = parse_attr(chars, i + 1)?;
                compound.attrs.push(cond);
                i = next;
            }
            c if c.is_whitespace() || c == '>' => break,
            c => return Err(format!("unsupported character '{c}'")),
        }
    }
    Ok((compound, i))
}

fn parse_attr(chars: &[char], mut i: usize) -> Result<(AttrCond, usize), String> {
    let (name, next) = read_ident(chars, i);
    if name.is_empty() {
        return Err("empty attribute name".to_string());
    }
    i = next;
    let op = match chars.get(i) {
        Some(']') => {
            return Ok((
                AttrCond {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                },
                i + 1,
            ));
        }
        Some('=') => {
            i += 1;
            AttrOp::Equals
        }
        Some(c @ ('^' | '*' | '$')) if chars.get(i + 1) == Some(&'=') => {
            let op = match c {
                '^' => AttrOp::Prefix,
                '*' => AttrOp::Contains,
                _ => AttrOp::Suffix,
            };
            i += 2;
            op
        }
        _ => return Err("bad attribute operator".to_string()),
    };

    let value = match chars.get(i) {
        Some(q @ ('\'' | '"')) => {
            let close = chars[i + 1..]
                .iter()
                .position(|c| c == q)
                .ok_or_else(|| "unterminated attribute value".to_string())?;
            let value: String = chars[i + 1..i + 1 + close].iter().collect();
            i += close + 2;
            value
        }
        _ => {
            let start = i;
            while i < chars.len() && chars[i] != ']' {
                i += 1;
            }
            chars[start..i].iter().collect::<String>().trim().to_string()
        }
    };
    if chars.get(i) != Some(&']') {
        return Err("missing ']'".to_string());
    }
    Ok((AttrCond { name, op, value }, i + 1))
}
