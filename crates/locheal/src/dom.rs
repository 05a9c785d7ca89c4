//! Arena-backed HTML document tree.
//!
//! Every node gets a [`NodeId`] at parse time. Ids are dense, stable for the
//! lifetime of the tree, and increase in document order, so they double as the
//! visited-set key for graph searches and as the sort key for query results.
//!
//! The parser is deliberately forgiving: it accepts the kind of markup test
//! suites snapshot from live pages (unclosed elements, stray end tags, boolean
//! attributes, unquoted values). Only a blank document is rejected.

use std::collections::HashMap;
use std::fmt;

use crate::result::{HealError, HealResult};

/// Stable identifier of a node inside one [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index of the node
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Immutable parsed document.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    id_index: HashMap<String, Vec<NodeId>>,
}

const VOID_TAGS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_TAGS: [&str; 2] = ["script", "style"];

const HIDDEN_CLASSES: [&str; 3] = ["hidden", "invisible", "none"];

/// Utility classes that take an element out of the rendered page
const HIDING_CLASSES: [&str; 4] = ["hidden", "invisible", "d-none", "display-none"];

/// Parse a full page.
///
/// # Errors
///
/// Returns [`HealError::InvalidInput`] when `html` is empty or whitespace.
pub fn parse(html: &str) -> HealResult<Tree> {
    if html.trim().is_empty() {
        return Err(HealError::invalid_input("HTML string cannot be empty"));
    }
    Parser::new(html, false).run()
}

/// Parse an HTML fragment such as a stored element subtree.
///
/// Unlike [`parse`], unterminated tags and comments are reported instead of
/// being folded into text.
///
/// # Errors
///
/// Returns [`HealError::InvalidInput`] for blank input and
/// [`HealError::HtmlParse`] for truncated markup.
pub fn parse_fragment(html: &str) -> HealResult<Tree> {
    if html.trim().is_empty() {
        return Err(HealError::invalid_input("HTML fragment cannot be empty"));
    }
    Parser::new(html, true).run()
}

impl Tree {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            id_index: HashMap::new(),
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_element(&mut self, parent: NodeId, tag: String, attrs: Vec<(String, String)>) -> NodeId {
        let id_attr = attrs
            .iter()
            .find(|(name, _)| name == "id")
            .map(|(_, value)| value.clone());
        let node = self.push(parent, NodeKind::Element(Element { tag, attrs }));
        if let Some(id_attr) = id_attr {
            self.id_index.entry(id_attr).or_default().push(node);
        }
        node
    }

    fn push_text(&mut self, parent: NodeId, text: String) {
        // Adjacent text (split by a skipped comment) is merged.
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(&text);
                return;
            }
        }
        self.push(parent, NodeKind::Text(text));
    }

    /// The document node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Total number of nodes, including the document and text nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds nothing but the document node
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Whether the node is an element
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Raw content of a text node
    #[must_use]
    pub fn text_value(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Lowercased tag name of an element
    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    /// Attribute value by (lowercase) name
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the element carries the attribute at all
    #[must_use]
    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// All attributes in source order
    #[must_use]
    pub fn attrs(&self, id: NodeId) -> Vec<(&str, &str)> {
        self.element(id)
            .map(|e| {
                e.attrs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Non-empty attribute value (empty strings count as absent)
    #[must_use]
    pub fn attr_non_empty(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attr(id, name).filter(|v| !v.trim().is_empty())
    }

    /// Class list of an element
    #[must_use]
    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Elements whose `id` attribute equals `id`
    #[must_use]
    pub fn by_id(&self, id: &str) -> Vec<NodeId> {
        self.id_index.get(id).cloned().unwrap_or_default()
    }

    /// Parent node (the document node has none)
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// Parent if it is an element
    #[must_use]
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| self.is_element(*p))
    }

    /// Ordered child nodes, text included
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Ordered element children
    #[must_use]
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Element siblings including the node itself, with the node's position
    #[must_use]
    pub fn element_siblings(&self, id: NodeId) -> (Vec<NodeId>, Option<usize>) {
        let Some(parent) = self.parent(id) else {
            return (Vec::new(), None);
        };
        let siblings = self.element_children(parent);
        let position = siblings.iter().position(|s| *s == id);
        (siblings, position)
    }

    /// Previous element sibling
    #[must_use]
    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (siblings, position) = self.element_siblings(id);
        position
            .and_then(|p| p.checked_sub(1))
            .and_then(|p| siblings.get(p).copied())
    }

    /// Element ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent_element(id), move |n| self.parent_element(*n))
    }

    /// Distance from the document: top-level elements have depth 0
    #[must_use]
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Every element in document order
    #[must_use]
    pub fn elements(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.is_element(*id))
            .collect()
    }

    /// Every text node in document order
    #[must_use]
    pub fn text_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.text_value(*id).is_some())
            .collect()
    }

    /// Element descendants of `id` (excluding `id`) in document order
    #[must_use]
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
                stack.extend(self.children(node).iter().rev().copied());
            }
        }
        out
    }

    /// Concatenated text of the subtree, whitespace preserved
    #[must_use]
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(text) = self.text_value(id) {
            out.push_str(text);
            return;
        }
        for child in self.children(id) {
            self.collect_text(*child, out);
        }
    }

    /// Text pieces of the subtree, each trimmed, joined by single spaces
    #[must_use]
    pub fn text_trimmed(&self, id: NodeId) -> String {
        let mut pieces = Vec::new();
        self.collect_trimmed(id, &mut pieces);
        pieces.join(" ")
    }

    fn collect_trimmed<'a>(&'a self, id: NodeId, pieces: &mut Vec<&'a str>) {
        if let Some(text) = self.text_value(id) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed);
            }
            return;
        }
        for child in self.children(id) {
            self.collect_trimmed(*child, pieces);
        }
    }

    /// Text of the direct text children only
    #[must_use]
    pub fn own_texts(&self, id: NodeId) -> Vec<&str> {
        self.children(id)
            .iter()
            .filter_map(|c| self.text_value(*c))
            .collect()
    }

    /// Whether the element renders: no inline `display:none` or
    /// `visibility:hidden` and no `hidden` attribute on it or any ancestor,
    /// and no hiding utility class on the element itself
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        if self.classes(id).iter().any(|c| HIDING_CLASSES.contains(c)) {
            return false;
        }
        std::iter::once(id).chain(self.ancestors(id)).all(|node| {
            !self.has_attr(node, "hidden") && !self.attr(node, "style").is_some_and(style_hides)
        })
    }

    /// Non-empty trimmed text nodes a user could see
    #[must_use]
    pub fn visible_texts(&self) -> Vec<String> {
        self.text_nodes()
            .into_iter()
            .filter_map(|text_node| {
                let text = self.text_value(text_node)?.trim();
                if text.is_empty() {
                    return None;
                }
                let parent = self.parent_element(text_node)?;
                let tag = self.tag_name(parent)?;
                if RAW_TEXT_TAGS.contains(&tag) {
                    return None;
                }
                if self
                    .classes(parent)
                    .iter()
                    .any(|c| HIDDEN_CLASSES.contains(c))
                {
                    return None;
                }
                if !self.is_visible(parent) {
                    return None;
                }
                Some(text.to_string())
            })
            .collect()
    }
}

fn style_hides(style: &str) -> bool {
    let compact: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.contains("display:none") || compact.contains("visibility:hidden")
}

struct Parser<'a> {
    html: &'a str,
    bytes: &'a [u8],
    pos: usize,
    strict: bool,
    tree: Tree,
    stack: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn new(html: &'a str, strict: bool) -> Self {
        let tree = Tree::new();
        let root = tree.root();
        Self {
            html,
            bytes: html.as_bytes(),
            pos: 0,
            strict,
            tree,
            stack: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(NodeId(0))
    }

    fn run(mut self) -> HealResult<Tree> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'<' {
                if self.starts_with(b"<!--") {
                    self.skip_comment()?;
                    continue;
                }
                if self.starts_with(b"<!") || self.starts_with(b"<?") {
                    self.skip_declaration()?;
                    continue;
                }
                if self.starts_with(b"</") {
                    self.end_tag()?;
                    continue;
                }
                if self
                    .bytes
                    .get(self.pos + 1)
                    .is_some_and(u8::is_ascii_alphabetic)
                {
                    self.start_tag()?;
                    continue;
                }
                // A bare '<' is text.
                self.text_until_next_tag(self.pos + 1);
                continue;
            }
            self.text_until_next_tag(self.pos);
        }
        Ok(self.tree)
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.bytes
            .get(self.pos..self.pos + prefix.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(prefix))
    }

    fn find_from(&self, from: usize, needle: &[u8]) -> Option<usize> {
        if from > self.bytes.len() {
            return None;
        }
        self.bytes[from..]
            .windows(needle.len())
            .position(|w| w.eq_ignore_ascii_case(needle))
            .map(|p| p + from)
    }

    fn truncated(&mut self, what: &str) -> HealResult<()> {
        if self.strict {
            return Err(HealError::html_parse(format!("unclosed {what}")));
        }
        self.pos = self.bytes.len();
        Ok(())
    }

    fn skip_comment(&mut self) -> HealResult<()> {
        match self.find_from(self.pos + 4, b"-->") {
            Some(end) => {
                self.pos = end + 3;
                Ok(())
            }
            None => self.truncated("comment"),
        }
    }

    fn skip_declaration(&mut self) -> HealResult<()> {
        match self.find_from(self.pos + 2, b">") {
            Some(end) => {
                self.pos = end + 1;
                Ok(())
            }
            None => self.truncated("declaration"),
        }
    }

    fn text_until_next_tag(&mut self, from: usize) {
        let start = self.pos;
        let end = self.find_from(from, b"<").unwrap_or(self.bytes.len());
        self.pos = end;
        if let Some(raw) = self.html.get(start..end) {
            if !raw.is_empty() {
                let parent = self.current();
                self.tree.push_text(parent, decode_entities(raw));
            }
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn read_name(&mut self, is_name_byte: fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_name_byte(self.bytes[self.pos]) {
            self.pos += 1;
        }
        self.html
            .get(start..self.pos)
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    fn start_tag(&mut self) -> HealResult<()> {
        let tag_start = self.pos;
        self.pos += 1;
        let tag = self.read_name(is_tag_byte);
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_ws();
            match self.bytes.get(self.pos) {
                None => {
                    if self.strict {
                        return Err(HealError::html_parse(format!("unclosed <{tag}> start tag")));
                    }
                    // Treat the dangling tag as text, like a browser would show it.
                    self.pos = tag_start;
                    let parent = self.current();
                    let rest = self.html.get(tag_start..).unwrap_or_default().to_string();
                    self.tree.push_text(parent, rest);
                    self.pos = self.bytes.len();
                    return Ok(());
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.bytes.get(self.pos) == Some(&b'>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                Some(_) => {
                    let name = self.read_name(is_attr_name_byte);
                    if name.is_empty() {
                        // Skip a byte we cannot interpret.
                        self.pos += 1;
                        continue;
                    }
                    self.skip_ws();
                    let value = if self.bytes.get(self.pos) == Some(&b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        self.attr_value()?
                    } else {
                        String::new()
                    };
                    if !attrs.iter().any(|(existing, _)| *existing == name) {
                        attrs.push((name, value));
                    }
                }
            }
        }

        let parent = self.current();
        let node = self.tree.push_element(parent, tag.clone(), attrs);

        if RAW_TEXT_TAGS.contains(&tag.as_str()) {
            let closing = format!("</{tag}");
            let end = match self.find_from(self.pos, closing.as_bytes()) {
                Some(end) => end,
                None if self.strict => {
                    return Err(HealError::html_parse(format!("unclosed <{tag}>")));
                }
                None => self.bytes.len(),
            };
            if let Some(body) = self.html.get(self.pos..end) {
                if !body.is_empty() {
                    self.tree.push_text(node, body.to_string());
                }
            }
            self.pos = end;
            if self.pos < self.bytes.len() {
                self.end_tag()?;
            }
            return Ok(());
        }

        if !self_closing && !VOID_TAGS.contains(&tag.as_str()) {
            self.stack.push(node);
        }
        Ok(())
    }

    fn attr_value(&mut self) -> HealResult<String> {
        match self.bytes.get(self.pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let start = self.pos + 1;
                let Some(end) = self.bytes[start..]
                    .iter()
                    .position(|b| *b == quote)
                    .map(|p| p + start)
                else {
                    if self.strict {
                        return Err(HealError::html_parse("unclosed quoted attribute value"));
                    }
                    let value = self.html.get(start..).unwrap_or_default().to_string();
                    self.pos = self.bytes.len();
                    return Ok(decode_entities(&value));
                };
                let value = self.html.get(start..end).unwrap_or_default();
                self.pos = end + 1;
                Ok(decode_entities(value))
            }
            _ => {
                let start = self.pos;
                while self.pos < self.bytes.len()
                    && !self.bytes[self.pos].is_ascii_whitespace()
                    && self.bytes[self.pos] != b'>'
                    && !(self.bytes[self.pos] == b'/' && self.bytes.get(self.pos + 1) == Some(&b'>'))
                {
                    self.pos += 1;
                }
                Ok(decode_entities(
                    self.html.get(start..self.pos).unwrap_or_default(),
                ))
            }
        }
    }

    fn end_tag(&mut self) -> HealResult<()> {
        self.pos += 2;
        let tag = self.read_name(is_tag_byte);
        match self.find_from(self.pos, b">") {
            Some(end) => self.pos = end + 1,
            None => {
                self.truncated("end tag")?;
            }
        }
        // Stray end tags with no open counterpart are ignored.
        if let Some(open_at) = self
            .stack
            .iter()
            .rposition(|n| self.tree.tag_name(*n) == Some(tag.as_str()))
        {
            if open_at > 0 {
                self.stack.truncate(open_at);
            }
        }
        Ok(())
    }
}

fn is_tag_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn is_attr_name_byte(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<')
}

/// Decode the character references that appear in test fixtures and
/// scraped pages. Unknown references are left untouched.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|semi| *semi <= 10).and_then(|semi| {
            let name = &tail[1..semi];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => name.strip_prefix('#').and_then(|num| {
                    let code = if let Some(hex) =
                        num.strip_prefix('x').or_else(|| num.strip_prefix('X'))
                    {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
