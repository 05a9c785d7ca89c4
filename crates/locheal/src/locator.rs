//! Locator values and element locator generation.
//!
//! A locator is the string a test uses to find an element plus the strategy
//! that interprets it. Generated locators are always CSS and always parse
//! with this crate's selector engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dom::{NodeId, Tree};
use crate::result::{HealError, HealResult};

/// Attributes that exist purely for test automation, in preference order
pub const TEST_ATTRIBUTES: [&str; 3] = ["data-testid", "data-test", "data-cy"];

/// Locator strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorType {
    /// CSS selector
    #[default]
    Css,
    /// XPath expression
    Xpath,
    /// Bare `id` attribute value
    Id,
    /// Bare `name` attribute value
    Name,
}

impl LocatorType {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Xpath => "xpath",
            Self::Id => "id",
            Self::Name => "name",
        }
    }
}

impl fmt::Display for LocatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocatorType {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" | "css_selector" => Ok(Self::Css),
            "xpath" => Ok(Self::Xpath),
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            other => Err(HealError::invalid_input(format!(
                "unknown locator type '{other}' (expected css, xpath, id or name)"
            ))),
        }
    }
}

/// A validated, non-empty locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// Selector text
    pub value: String,
    /// Strategy
    #[serde(rename = "type")]
    pub locator_type: LocatorType,
}

impl Locator {
    /// Create a locator, rejecting blank values
    pub fn new(value: impl Into<String>, locator_type: LocatorType) -> HealResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(HealError::invalid_input("locator cannot be empty"));
        }
        Ok(Self {
            value,
            locator_type,
        })
    }

    /// CSS locator
    pub fn css(value: impl Into<String>) -> HealResult<Self> {
        Self::new(value, LocatorType::Css)
    }

    /// XPath locator
    pub fn xpath(value: impl Into<String>) -> HealResult<Self> {
        Self::new(value, LocatorType::Xpath)
    }

    /// Number of `/`-separated path steps for XPath, whitespace-separated
    /// segments otherwise
    #[must_use]
    pub fn segment_count(&self) -> usize {
        segment_count(&self.value, self.locator_type)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.locator_type, self.value)
    }
}

/// Segment count of a locator string (see [`Locator::segment_count`])
#[must_use]
pub fn segment_count(value: &str, locator_type: LocatorType) -> usize {
    match locator_type {
        LocatorType::Xpath => value.split('/').filter(|s| !s.is_empty()).count(),
        _ => value.split_whitespace().count(),
    }
}

/// Whether `value` can be written as a bare CSS identifier
#[must_use]
pub fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let starts_ok = first.is_ascii_alphabetic()
        || first == '_'
        || (first == '-' && value.chars().nth(1).is_some_and(|c| !c.is_ascii_digit()));
    starts_ok && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Quote a value for a CSS attribute selector
#[must_use]
pub fn css_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Attribute-equality selector for `name=value`
#[must_use]
pub fn attr_selector(name: &str, value: &str) -> String {
    format!("[{name}={}]", css_quote(value))
}

fn id_selector(id: &str) -> String {
    if is_css_ident(id) {
        format!("#{id}")
    } else {
        attr_selector("id", id)
    }
}

/// Generate the preferred CSS locator for an element.
///
/// Preference: `#id`, test attribute, `[name="..."]`, first class, tag.
/// Returns `None` for non-element nodes.
#[must_use]
pub fn element_locator(tree: &Tree, node: NodeId) -> Option<String> {
    let tag = tree.tag_name(node)?;
    if let Some(id) = tree.attr_non_empty(node, "id") {
        return Some(id_selector(id));
    }
    for attr in TEST_ATTRIBUTES {
        if let Some(value) = tree.attr_non_empty(node, attr) {
            return Some(attr_selector(attr, value));
        }
    }
    if let Some(name) = tree.attr_non_empty(node, "name") {
        return Some(attr_selector("name", name));
    }
    if let Some(class) = tree.classes(node).first() {
        if is_css_ident(class) {
            return Some(format!(".{class}"));
        }
        return Some(format!("{tag}[class~={}]", css_quote(class)));
    }
    Some(tag.to_string())
}

/// One compound step describing `node` among its siblings
fn path_step(tree: &Tree, node: NodeId) -> Option<String> {
    let tag = tree.tag_name(node)?;
    if let Some(id) = tree.attr_non_empty(node, "id") {
        return Some(format!("{tag}{}", id_selector(id)));
    }
    let mut step = tag.to_string();
    for class in tree.classes(node).into_iter().filter(|c| is_css_ident(c)) {
        step.push('.');
        step.push_str(class);
    }
    let (siblings, _) = tree.element_siblings(node);
    let same_tag: Vec<NodeId> = siblings
        .into_iter()
        .filter(|s| tree.tag_name(*s) == Some(tag))
        .collect();
    if same_tag.len() > 1 {
        if let Some(position) = same_tag.iter().position(|s| *s == node) {
            step.push_str(&format!(":nth-of-type({})", position + 1));
        }
    }
    Some(step)
}

/// Shortest descendant chain, built from the element upward, that selects
/// exactly this element. Falls back to the full chain from the top level.
#[must_use]
pub fn unique_css_path(tree: &Tree, node: NodeId) -> Option<String> {
    let mut steps = vec![path_step(tree, node)?];
    let mut current = node;
    loop {
        let candidate = steps.iter().rev().cloned().collect::<Vec<_>>().join(" ");
        if tree.try_select(&candidate).is_ok_and(|m| m == [node]) {
            return Some(candidate);
        }
        match tree.parent_element(current) {
            Some(parent) => {
                steps.push(path_step(tree, parent)?);
                current = parent;
            }
            None => return Some(candidate),
        }
    }
}

/// Descendant chain from the top-level element down to `node`
#[must_use]
pub fn full_css_path(tree: &Tree, node: NodeId) -> Option<String> {
    let mut steps = vec![path_step(tree, node)?];
    let mut current = node;
    while let Some(parent) = tree.parent_element(current) {
        steps.push(path_step(tree, parent)?);
        current = parent;
    }
    steps.reverse();
    Some(steps.join(" "))
}

/// Preferred locator if it is unique on the page, otherwise the structural
/// path
#[must_use]
pub fn best_locator(tree: &Tree, node: NodeId) -> Option<String> {
    let simple = element_locator(tree, node)?;
    if tree.select(&simple) == [node] {
        return Some(simple);
    }
    unique_css_path(tree, node).or(Some(simple))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::parse;

    #[test]
    fn test_locator_type_round_trip() {
        for t in [LocatorType::Css, LocatorType::Xpath, LocatorType::Id, LocatorType::Name] {
            assert_eq!(t.as_str().parse::<LocatorType>().unwrap(), t);
            assert_eq!(serde_json::to_string(&t).unwrap(), format!("\"{}\"", t.as_str()));
        }
        assert!("link_text".parse::<LocatorType>().is_err());
    }

    #[test]
    fn test_locator_rejects_blank() {
        assert!(Locator::css("  ").is_err());
        let loc = Locator::xpath("//div/span[2]").unwrap();
        assert_eq!(loc.segment_count(), 2);
        assert_eq!(loc.to_string(), "xpath=//div/span[2]");
    }

    #[test]
    fn test_css_ident() {
        assert!(is_css_ident("login-btn"));
        assert!(is_css_ident("_x1"));
        assert!(!is_css_ident("1abc"));
        assert!(!is_css_ident("-1"));
        assert!(!is_css_ident("a:b"));
        assert!(!is_css_ident(""));
    }

    #[test]
    fn test_element_locator_preference() {
        let tree = parse(
            r#"<button id="go" data-testid="t" class="c">A</button>
               <button data-cy="cy" name="n">B</button>
               <input name="email">
               <span class="badge big">C</span>
               <em>D</em>
               <p id="9lives">E</p>"#,
        )
        .unwrap();
        let locators: Vec<_> = tree
            .elements()
            .into_iter()
            .map(|e| element_locator(&tree, e).unwrap())
            .collect();
        assert_eq!(
            locators,
            vec![
                "#go",
                "[data-cy=\"cy\"]",
                "[name=\"email\"]",
                ".badge",
                "em",
                "[id=\"9lives\"]"
            ]
        );
    }

    #[test]
    fn test_generated_locators_select_their_element() {
        let tree = parse(
            r#"<div class="list">
                 <div class="item"><h3>A</h3><div class="actions"><button>Buy</button></div></div>
                 <div class="item"><h3>B</h3><div class="actions"><button>Buy</button></div></div>
               </div>"#,
        )
        .unwrap();
        let buttons = tree.select("button");
        assert_eq!(buttons.len(), 2);
        for button in buttons {
            let path = best_locator(&tree, button).unwrap();
            assert_eq!(tree.select(&path), vec![button], "path {path}");
        }
    }
}
