//! Selector parsing and matching.
//!
//! Supported grammar:
//!
//! - compound: `tag` or `*`, then any of `#id`, `.class`, `[attr]`,
//!   `[attr=v]`, `[attr~=v]`, `[attr^=v]`, `[attr$=v]`, `[attr*=v]`, `[attr|=v]`
//! - combinators: descendant (whitespace) and child (`>`)
//! - lists: `a, b`
//!
//! Matching walks light-tree parents only; it never crosses a shadow root.

use super::tree::{self, NodeId};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrSelector {
    name: String,
    test: Option<(AttrOp, String)>,
}

impl AttrSelector {
    fn matches(&self, element: NodeId) -> bool {
        let Some(actual) = tree::get_attribute(element, &self.name) else {
            return false;
        };
        let Some((op, expected)) = &self.test else {
            return true;
        };
        let expected = expected.as_str();
        match op {
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_whitespace().any(|w| w == expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
            AttrOp::DashMatch => {
                actual == expected
                    || actual
                        .strip_prefix(expected)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, element: NodeId) -> bool {
        let Some(tag) = tree::tag_name(element) else {
            return false;
        };
        if self.tag.as_ref().is_some_and(|t| *t != tag) {
            return false;
        }
        if let Some(id) = &self.id {
            if tree::get_attribute(element, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = tree::class_list(element);
            if !self.classes.iter().all(|c| classes.contains(c)) {
                return false;
            }
        }
        self.attrs.iter().all(|a| a.matches(element))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// `compounds[i]` and `compounds[i + 1]` are joined by `combinators[i]`.
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches(&self, element: NodeId) -> bool {
        self.matches_at(element, self.compounds.len() - 1)
    }

    fn matches_at(&self, element: NodeId, index: usize) -> bool {
        if !self.compounds[index].matches(element) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => {
                tree::parent(element).is_some_and(|p| self.matches_at(p, index - 1))
            }
            Combinator::Descendant => {
                let mut current = tree::parent(element);
                while let Some(ancestor) = current {
                    if self.matches_at(ancestor, index - 1) {
                        return true;
                    }
                    current = tree::parent(ancestor);
                }
                false
            }
        }
    }
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        Parser::new(source).parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, element: NodeId) -> bool {
        tree::is_element(element) && self.alternatives.iter().any(|c| c.matches(element))
    }

    /// Matching descendants of `root`, in document order.
    pub fn query_all(&self, root: NodeId) -> Vec<NodeId> {
        tree::descendants(root)
            .into_iter()
            .filter(|n| self.matches(*n))
            .collect()
    }

    pub fn query(&self, root: NodeId) -> Option<NodeId> {
        tree::descendants(root).into_iter().find(|n| self.matches(*n))
    }

    /// Attribute names whose changes can alter this selector's matches.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };
        for compound in self.alternatives.iter().flat_map(|c| &c.compounds) {
            if compound.id.is_some() {
                push("id");
            }
            if !compound.classes.is_empty() {
                push("class");
            }
            for attr in &compound.attrs {
                push(&attr.name);
            }
        }
        names
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSelector {
            selector: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("expected a name at position {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse(mut self) -> Result<Selector> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_whitespace();
            alternatives.push(self.complex()?);
            match self.peek() {
                Some(',') => self.pos += 1,
                None => break,
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            }
        }
        Ok(Selector {
            source: self.source.to_string(),
            alternatives,
        })
    }

    fn complex(&mut self) -> Result<Complex> {
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_space => combinators.push(Combinator::Descendant),
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            }
            compounds.push(self.compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut universal = false;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => return Err(self.error("pseudo-classes are not supported")),
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return Err(self.error(format!("expected a selector at position {}", self.pos)));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttrSelector> {
        self.skip_whitespace();
        let mut name = self.ident()?;
        // Namespaced names such as `xlink:href`.
        if self.peek() == Some(':') {
            self.pos += 1;
            name.push(':');
            name.push_str(&self.ident()?);
        }
        let name = name.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrSelector { name, test: None });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c) => {
                let op = match c {
                    '~' => AttrOp::Includes,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Substring,
                    '|' => AttrOp::DashMatch,
                    _ => return Err(self.error(format!("unexpected `{c}` in attribute selector"))),
                };
                self.pos += 1;
                if self.peek() != Some('=') {
                    return Err(self.error("expected `=` in attribute selector"));
                }
                self.pos += 1;
                op
            }
            None => return Err(self.error("unterminated attribute selector")),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated string"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.ident()?,
        };
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(self.error("expected `]`"));
        }
        self.pos += 1;
        Ok(AttrSelector {
            name,
            test: Some((op, value)),
        })
    }
}

// =============================================================================
// Convenience
// =============================================================================

pub fn query_all(root: NodeId, selector: &str) -> Result<Vec<NodeId>> {
    Ok(Selector::parse(selector)?.query_all(root))
}

pub fn query(root: NodeId, selector: &str) -> Result<Option<NodeId>> {
    Ok(Selector::parse(selector)?.query(root))
}

pub fn matches(element: NodeId, selector: &str) -> Result<bool> {
    Ok(Selector::parse(selector)?.matches(element))
}

/// Attribute names referenced by a selector: `class` for `.x`, `id` for
/// `#x`, and bracketed names. Empty when the selector does not parse.
pub fn attribute_filter(selector: &str) -> Vec<String> {
    Selector::parse(selector)
        .map(|s| s.attribute_names())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, reset_dom};

    /// body > section#main > (ul.list > li.item[data-id=1], li.item.active[data-id=2]), p[lang=en-US]
    fn setup() -> (NodeId, Vec<NodeId>) {
        reset_dom();
        let body = dom::create_element("body");
        dom::append_child(dom::document(), body);
        let section = dom::create_element("section");
        dom::set_attribute(section, "id", "main");
        dom::append_child(body, section);
        let list = dom::create_element("ul");
        dom::set_attribute(list, "class", "list");
        dom::append_child(section, list);
        let a = dom::create_element("li");
        dom::set_attribute(a, "class", "item");
        dom::set_attribute(a, "data-id", "1");
        let b = dom::create_element("li");
        dom::set_attribute(b, "class", "item active");
        dom::set_attribute(b, "data-id", "2");
        dom::append_child(list, a);
        dom::append_child(list, b);
        let p = dom::create_element("p");
        dom::set_attribute(p, "lang", "en-US");
        dom::append_child(section, p);
        (body, vec![section, list, a, b, p])
    }

    #[test]
    fn test_compound_selectors() {
        let (body, nodes) = setup();
        let [section, list, a, b, p] = nodes[..] else { panic!() };
        assert_eq!(query_all(body, "li").unwrap(), vec![a, b]);
        assert_eq!(query_all(body, ".item.active").unwrap(), vec![b]);
        assert_eq!(query(body, "#main").unwrap(), Some(section));
        assert_eq!(query(body, "ul.list").unwrap(), Some(list));
        assert_eq!(query_all(body, "[data-id]").unwrap(), vec![a, b]);
        assert_eq!(query_all(body, "[data-id='2']").unwrap(), vec![b]);
        assert_eq!(query_all(body, "[lang|=en]").unwrap(), vec![p]);
        assert_eq!(query_all(body, "[class~=active]").unwrap(), vec![b]);
        assert_eq!(query_all(body, "[lang^=en]").unwrap(), vec![p]);
        assert_eq!(query_all(body, "[lang$=US]").unwrap(), vec![p]);
        assert_eq!(query_all(body, "[lang*=n-U]").unwrap(), vec![p]);
        assert_eq!(query_all(body, "*").unwrap().len(), 5);
    }

    #[test]
    fn test_combinators_and_lists() {
        let (body, nodes) = setup();
        let [section, _, a, b, p] = nodes[..] else { panic!() };
        assert_eq!(query_all(body, "section li").unwrap(), vec![a, b]);
        assert_eq!(query_all(body, "section > li").unwrap(), Vec::<NodeId>::new());
        assert_eq!(query_all(body, "#main > p").unwrap(), vec![p]);
        assert_eq!(query_all(body, "p, #main").unwrap(), vec![section, p]);
        assert!(matches(b, "ul > .active").unwrap());
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("li:hover").is_err());
        assert!(Selector::parse("[x").is_err());
        assert!(Selector::parse("a,,b").is_err());
        assert!(Selector::parse("[x~y]").is_err());
    }

    #[test]
    fn test_attribute_filter() {
        assert_eq!(attribute_filter("li"), Vec::<String>::new());
        assert_eq!(attribute_filter("li.item"), vec!["class"]);
        assert_eq!(
            attribute_filter("#a .b[data-x], [aria-hidden=true].c"),
            vec!["id", "class", "data-x", "aria-hidden"]
        );
    }
}
