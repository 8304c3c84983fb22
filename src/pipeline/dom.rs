//! Owned HTML tree: parse with html5ever, edit in place, write back as XHTML.
//!
//! `markup5ever_rcdom` hands out `Rc<RefCell<…>>` handles, which are awkward
//! to rewrite and cannot cross threads. The parser converts the `RcDom` once
//! into plain [`Node`] values so the rest of the pipeline can clone, move and
//! mutate fragments freely, and the renderers can run on blocking threads.
//!
//! Comments, doctypes, `<script>`, `<style>` and `<noscript>` are dropped
//! during conversion. `<math>` and `<svg>` gain their namespace declarations
//! so the serialised fragments are valid inside an XHTML document.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use serde::{Serialize, Serializer};

pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const DROPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// A node of the owned tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with ordered attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// What [`rewrite_elements`] should do with the element it just visited.
pub enum Rewrite {
    /// Keep the element and descend into its children.
    Keep,
    /// Splice these nodes in its place; they are not visited.
    Replace(Vec<Node>),
    /// Drop the element and its subtree.
    Remove,
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// Parse an HTML document and return its root `<html>` element.
///
/// html5ever never fails: malformed markup is repaired the way browsers do.
pub fn parse_html(html: &str) -> Element {
    let dom = parse_document(RcDom::default(), Default::default()).one(html);
    let children = dom.document.children.borrow();
    children
        .iter()
        .filter_map(convert_handle)
        .find_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
        .unwrap_or_else(|| Element::new("html"))
}

/// Parse an HTML fragment and return the children of `<body>`.
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let root = parse_html(html);
    root.children
        .into_iter()
        .find_map(|n| match n {
            Node::Element(e) if e.name == "body" => Some(e.children),
            _ => None,
        })
        .unwrap_or_default()
}

fn convert_handle(handle: &Handle) -> Option<Node> {
    match &handle.data {
        NodeData::Text { contents } => Some(Node::Text(contents.borrow().to_string())),
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.to_string();
            if DROPPED_ELEMENTS.contains(&tag.as_str()) {
                return None;
            }
            let mut el = Element::new(&tag);
            for a in attrs.borrow().iter() {
                let key = match &a.name.prefix {
                    Some(prefix) => format!("{}:{}", prefix, a.name.local),
                    None => a.name.local.to_string(),
                };
                if is_xml_name(&key) && el.attr(&key).is_none() {
                    el.attrs.push((key, a.value.to_string()));
                }
            }
            match tag.as_str() {
                "math" if el.attr("xmlns").is_none() => el.set_attr("xmlns", MATHML_NS),
                "svg" => {
                    if el.attr("xmlns").is_none() {
                        el.set_attr("xmlns", SVG_NS);
                    }
                    if el.attr("xmlns:xlink").is_none() {
                        el.set_attr("xmlns:xlink", XLINK_NS);
                    }
                }
                _ => {}
            }
            el.children = handle
                .children
                .borrow()
                .iter()
                .filter_map(convert_handle)
                .collect();
            Some(Node::Element(el))
        }
        _ => None,
    }
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

// ── Element API ──────────────────────────────────────────────────────────

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or overwrite an attribute, keeping its original position.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|v| !v.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn has_any_class(&self, classes: &[&str]) -> bool {
        self.classes().any(|c| classes.contains(&c))
    }

    /// Append `class` unless already present.
    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr("class", joined);
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text of the whole subtree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// First descendant (document order, excluding `self`) matching `pred`.
    pub fn find<F>(&self, pred: F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        find_in(&self.children, &pred)
    }

    /// All descendants (document order, excluding `self`) matching `pred`.
    pub fn find_all<F>(&self, pred: F) -> Vec<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        let mut out = Vec::new();
        find_all_in(&self.children, &pred, &mut out);
        out
    }

    /// Serialise this element as XHTML.
    pub fn to_xhtml(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Node::Element(e) => e.text(),
            Node::Text(t) => t.clone(),
        }
    }

    pub fn to_xhtml(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_xhtml())
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for n in nodes {
        match n {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

fn find_in<'a, F>(nodes: &'a [Node], pred: &F) -> Option<&'a Element>
where
    F: Fn(&Element) -> bool,
{
    for n in nodes {
        if let Node::Element(e) = n {
            if pred(e) {
                return Some(e);
            }
            if let Some(found) = find_in(&e.children, pred) {
                return Some(found);
            }
        }
    }
    None
}

fn find_all_in<'a, F>(nodes: &'a [Node], pred: &F, out: &mut Vec<&'a Element>)
where
    F: Fn(&Element) -> bool,
{
    for n in nodes {
        if let Node::Element(e) = n {
            if pred(e) {
                out.push(e);
            }
            find_all_in(&e.children, pred, out);
        }
    }
}

// ── Tree rewriting ───────────────────────────────────────────────────────

/// Visit every element in document order, letting `f` mutate it.
pub fn for_each_element_mut<F>(nodes: &mut [Node], f: &mut F)
where
    F: FnMut(&mut Element),
{
    for n in nodes.iter_mut() {
        if let Node::Element(e) = n {
            f(e);
            for_each_element_mut(&mut e.children, f);
        }
    }
}

/// Visit elements in document order; `f` decides to keep, replace or drop each.
pub fn rewrite_elements<F>(nodes: &mut Vec<Node>, f: &mut F)
where
    F: FnMut(&mut Element) -> Rewrite,
{
    let mut i = 0;
    while i < nodes.len() {
        let action = match &mut nodes[i] {
            Node::Element(e) => f(e),
            Node::Text(_) => {
                i += 1;
                continue;
            }
        };
        match action {
            Rewrite::Keep => {
                if let Node::Element(e) = &mut nodes[i] {
                    rewrite_elements(&mut e.children, f);
                }
                i += 1;
            }
            Rewrite::Replace(replacement) => {
                let n = replacement.len();
                nodes.splice(i..=i, replacement);
                i += n;
            }
            Rewrite::Remove => {
                nodes.remove(i);
            }
        }
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── XHTML serialisation ──────────────────────────────────────────────────

/// Serialise a list of sibling nodes.
pub fn nodes_to_xhtml(nodes: &[Node]) -> String {
    let mut out = String::new();
    for n in nodes {
        write_node(n, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => escape_into(t, false, out),
        Node::Element(e) => write_element(e, out),
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (k, v) in &el.attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        escape_into(v, true, out);
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&el.name.as_str()) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for c in &el.children {
        write_node(c, out);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

/// Escape text for XML content (`attr = false`) or a double-quoted attribute.
pub fn escape_into(s: &str, attr: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(c),
        }
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, true, &mut out);
    out
}
