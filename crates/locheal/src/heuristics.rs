//! Heuristic rule engine.
//!
//! Each rule looks at the page independently and proposes candidates for the
//! broken locator. All rules run and their output is concatenated; nothing is
//! short-circuited, so the same locator may be proposed by several rules with
//! different provenance.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::candidate::{sort_by_score, Candidate};
use crate::config::HeuristicThresholds;
use crate::context::HealingContext;
use crate::dom::{NodeId, Tree};
use crate::locator::{attr_selector, best_locator, is_css_ident, LocatorType};
use crate::selector::is_xpath;
use crate::similarity::{jaccard, sequence_ratio, tokenize, TokenSet};

/// Test-automation attributes checked for exact matches
pub const EXACT_TEST_ATTRIBUTES: [&str; 4] = ["data-test", "data-testid", "data-test-id", "data-cy"];

const NON_RENDERED_TAGS: [&str; 5] = ["script", "style", "head", "title", "meta"];

static XPATH_TEXT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?:text\(\)|normalize-space\(\s*(?:text\(\)|\.)?\s*\))\s*=\s*(?:'([^']*)'|"([^"]*)")"#,
    )
    .ok()
});

static XPATH_INDEX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[\s*\d+\s*\]").ok());

/// The individual rules, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeuristicRule {
    TestAttributeExact,
    IdExact,
    NameExact,
    TokenizedFuzzy,
    VisibleText,
    RelaxedXpath,
    ClassExact,
    CssSelector,
    LinkTextExact,
    LinkTextPartial,
    CombinedSimilarity,
}

impl HeuristicRule {
    /// Every rule in execution order
    pub const ALL: [Self; 11] = [
        Self::TestAttributeExact,
        Self::IdExact,
        Self::NameExact,
        Self::TokenizedFuzzy,
        Self::VisibleText,
        Self::RelaxedXpath,
        Self::ClassExact,
        Self::CssSelector,
        Self::LinkTextExact,
        Self::LinkTextPartial,
        Self::CombinedSimilarity,
    ];

    /// Short rule name for logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TestAttributeExact => "test_attribute_exact",
            Self::IdExact => "id_exact",
            Self::NameExact => "name_exact",
            Self::TokenizedFuzzy => "tokenized_fuzzy",
            Self::VisibleText => "visible_text",
            Self::RelaxedXpath => "relaxed_xpath",
            Self::ClassExact => "class_exact",
            Self::CssSelector => "css_selector",
            Self::LinkTextExact => "link_text_exact",
            Self::LinkTextPartial => "link_text_partial",
            Self::CombinedSimilarity => "combined_similarity",
        }
    }
}

/// Everything a rule needs, computed once per request
struct RuleInput<'a> {
    tree: &'a Tree,
    locator: &'a str,
    locator_type: LocatorType,
    tokens: TokenSet,
    context: Option<&'a HealingContext>,
}

/// Collects a rule's output, one candidate per locator
#[derive(Default)]
struct RuleOutput {
    seen: HashSet<String>,
    candidates: Vec<Candidate>,
}

impl RuleOutput {
    fn push(&mut self, candidate: Candidate) {
        if self.seen.insert(candidate.locator.clone()) {
            self.candidates.push(candidate);
        }
    }
}

/// Heuristic candidate generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine {
    thresholds: HeuristicThresholds,
}

impl RuleEngine {
    #[must_use]
    pub const fn new(thresholds: HeuristicThresholds) -> Self {
        Self { thresholds }
    }

    /// Run every rule and return the candidates sorted by score, ties in
    /// discovery order
    #[must_use]
    pub fn generate(
        &self,
        tree: &Tree,
        original_locator: &str,
        original_type: LocatorType,
        context: Option<&HealingContext>,
    ) -> Vec<Candidate> {
        let input = RuleInput {
            tree,
            locator: original_locator,
            locator_type: original_type,
            tokens: tokenize(original_locator),
            context,
        };
        let mut candidates = Vec::new();
        for rule in HeuristicRule::ALL {
            let produced = self.apply(rule, &input);
            if !produced.is_empty() {
                debug!(rule = rule.name(), count = produced.len(), "heuristic rule matched");
            }
            candidates.extend(produced);
        }
        sort_by_score(&mut candidates);
        candidates
    }

    fn apply(&self, rule: HeuristicRule, input: &RuleInput<'_>) -> Vec<Candidate> {
        let mut out = RuleOutput::default();
        match rule {
            HeuristicRule::TestAttributeExact => test_attribute_exact(input, &mut out),
            HeuristicRule::IdExact => id_exact(input, &mut out),
            HeuristicRule::NameExact => name_exact(input, &mut out),
            HeuristicRule::TokenizedFuzzy => self.tokenized_fuzzy(input, &mut out),
            HeuristicRule::VisibleText => self.visible_text(input, &mut out),
            HeuristicRule::RelaxedXpath => relaxed_xpath(input, &mut out),
            HeuristicRule::ClassExact => class_exact(input, &mut out),
            HeuristicRule::CssSelector => css_selector(input, &mut out),
            HeuristicRule::LinkTextExact => link_text_exact(input, &mut out),
            HeuristicRule::LinkTextPartial => self.link_text_partial(input, &mut out),
            HeuristicRule::CombinedSimilarity => self.combined_similarity(input, &mut out),
        }
        out.candidates
    }

    fn tokenized_fuzzy(&self, input: &RuleInput<'_>, out: &mut RuleOutput) {
        let tree = input.tree;
        for element in tree.elements() {
            if let Some(id) = tree.attr_non_empty(element, "id") {
                let id_tokens = tokenize(id);
                if id_tokens.is_empty() {
                    continue;
                }
                let score = jaccard(&input.tokens, &id_tokens);
                if score > self.thresholds.fuzzy_token {
                    out.push(Candidate::css(
                        id_locator(id),
                        score,
                        format!("id tokenized fuzzy match (Jaccard: {score:.2})"),
                    ));
                }
            }
        }
        for element in tree.elements() {
            for class in tree.classes(element) {
                let class_tokens = tokenize(class);
                if class_tokens.is_empty() {
                    continue;
                }
                let score = jaccard(&input.tokens, &class_tokens);
                if score > self.thresholds.fuzzy_token {
                    out.push(Candidate::css(
                        class_locator(class),
                        score,
                        format!("class tokenized fuzzy match (Jaccard: {score:.2})"),
                    ));
                }
            }
        }
    }

    fn visible_text(&self, input: &RuleInput<'_>, out: &mut RuleOutput) {
        let Some(expected) = expected_text(input) else {
            return;
        };
        let tree = input.tree;
        for element in tree.elements() {
            if tree
                .tag_name(element)
                .is_some_and(|t| NON_RENDERED_TAGS.contains(&t))
            {
                continue;
            }
            let text = tree.text_trimmed(element);
            if text.is_empty() {
                continue;
            }
            let ratio = sequence_ratio(&expected, &text);
            if ratio > self.thresholds.visible_text {
                if let Some(locator) = best_locator(tree, element) {
                    out.push(Candidate::css(
                        locator,
                        ratio,
                        format!("visible text similarity ({ratio:.2})"),
                    ));
                }
            }
        }
    }

    fn link_text_partial(&self, input: &RuleInput<'_>, out: &mut RuleOutput) {
        let needle = input.locator.trim().to_lowercase();
        if needle.is_empty() {
            return;
        }
        for (link, text) in links(input.tree) {
            if text.is_empty() || text == input.locator.trim() {
                continue;
            }
            if !text.to_lowercase().contains(&needle) {
                continue;
            }
            let ratio = needle.chars().count() as f64 / text.chars().count() as f64;
            if ratio > self.thresholds.link_partial_ratio {
                if let Some(locator) = best_locator(input.tree, link) {
                    out.push(Candidate::css(
                        locator,
                        ratio * 0.8,
                        format!("hyperlink partial text match ({ratio:.2})"),
                    ));
                }
            }
        }
    }

    fn combined_similarity(&self, input: &RuleInput<'_>, out: &mut RuleOutput) {
        let tree = input.tree;
        for element in tree.elements() {
            let mut combined = TokenSet::new();
            for attr in ["id", "name"] {
                if let Some(value) = tree.attr_non_empty(element, attr) {
                    combined.extend(tokenize(value));
                }
            }
            for class in tree.classes(element) {
                combined.extend(tokenize(class));
            }
            if combined.is_empty() {
                continue;
            }
            let score = jaccard(&input.tokens, &combined);
            if score > self.thresholds.combined {
                if let Some(locator) = best_locator(tree, element) {
                    out.push(Candidate::css(
                        locator,
                        score,
                        format!("combined id/name/class similarity ({score:.2})"),
                    ));
                }
            }
        }
    }
}

/// Run every rule with default thresholds
#[must_use]
pub fn generate(
    tree: &Tree,
    original_locator: &str,
    original_type: LocatorType,
    context: Option<&HealingContext>,
) -> Vec<Candidate> {
    RuleEngine::default().generate(tree, original_locator, original_type, context)
}

fn id_locator(id: &str) -> String {
    if is_css_ident(id) {
        format!("#{id}")
    } else {
        attr_selector("id", id)
    }
}

fn class_locator(class: &str) -> String {
    if is_css_ident(class) {
        format!(".{class}")
    } else {
        format!("[class~={}]", crate::locator::css_quote(class))
    }
}

fn test_attribute_exact(input: &RuleInput<'_>, out: &mut RuleOutput) {
    let tree = input.tree;
    for attr in EXACT_TEST_ATTRIBUTES {
        if tree
            .elements()
            .into_iter()
            .any(|e| tree.attr(e, attr) == Some(input.locator))
        {
            out.push(Candidate::css(
                attr_selector(attr, input.locator),
                1.0,
                format!("{attr} exact match"),
            ));
        }
    }
}

fn id_exact(input: &RuleInput<'_>, out: &mut RuleOutput) {
    if !input.tree.by_id(input.locator).is_empty() {
        out.push(Candidate::css(id_locator(input.locator), 1.0, "id exact match"));
    }
}

fn name_exact(input: &RuleInput<'_>, out: &mut RuleOutput) {
    let tree = input.tree;
    if tree
        .elements()
        .into_iter()
        .any(|e| tree.attr(e, "name") == Some(input.locator))
    {
        out.push(Candidate::css(
            attr_selector("name", input.locator),
            1.0,
            "name exact match",
        ));
    }
}

fn class_exact(input: &RuleInput<'_>, out: &mut RuleOutput) {
    let tree = input.tree;
    if tree
        .elements()
        .into_iter()
        .any(|e| tree.classes(e).contains(&input.locator))
    {
        out.push(Candidate::css(
            class_locator(input.locator),
            1.0,
            "class name exact match",
        ));
    }
}

/// Expected element text: the context's `visible_text`, else the literal of
/// an XPath `text()='...'` predicate
fn expected_text(input: &RuleInput<'_>) -> Option<String> {
    if let Some(text) = input
        .context
        .and_then(|c| c.visible_text.as_deref())
        .filter(|t| !t.trim().is_empty())
    {
        return Some(text.to_string());
    }
    if input.locator_type != LocatorType::Xpath && !is_xpath(input.locator) {
        return None;
    }
    let captures = XPATH_TEXT.as_ref()?.captures(input.locator)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|t| !t.is_empty())
}

fn relaxed_xpath(input: &RuleInput<'_>, out: &mut RuleOutput) {
    if input.locator_type != LocatorType::Xpath {
        return;
    }
    let Some(index) = XPATH_INDEX.as_ref() else {
        return;
    };
    let relaxed = index.replace_all(input.locator, "").into_owned();
    if relaxed == input.locator {
        return;
    }
    if !input
        .tree
        .select_locator(&relaxed, LocatorType::Xpath)
        .is_empty()
    {
        out.push(Candidate::new(
            relaxed,
            LocatorType::Xpath,
            0.8,
            "relaxed XPath (removed indices)",
        ));
    }
}

fn css_selector(input: &RuleInput<'_>, out: &mut RuleOutput) {
    let tree = input.tree;
    match input.locator_type {
        LocatorType::Css | LocatorType::Xpath => {}
        LocatorType::Id | LocatorType::Name => return,
    }
    if !tree
        .select_locator(input.locator, input.locator_type)
        .is_empty()
    {
        let reason = match input.locator_type {
            LocatorType::Xpath => "xpath direct match",
            _ => "css selector direct match",
        };
        out.push(Candidate::new(
            input.locator,
            input.locator_type,
            1.0,
            reason,
        ));
        return;
    }
    if input.locator_type != LocatorType::Css {
        return;
    }
    let segments: Vec<&str> = input.locator.split_whitespace().collect();
    for start in 1..segments.len() {
        let simplified = segments[start..].join(" ");
        if !tree.select(&simplified).is_empty() {
            out.push(Candidate::css(
                simplified,
                0.8,
                format!("css selector simplified fallback (dropped {start} leading segments)"),
            ));
            break;
        }
    }
}

fn links(tree: &Tree) -> Vec<(NodeId, String)> {
    tree.elements()
        .into_iter()
        .filter(|e| tree.tag_name(*e) == Some("a"))
        .map(|a| (a, tree.text_trimmed(a)))
        .collect()
}

fn link_text_exact(input: &RuleInput<'_>, out: &mut RuleOutput) {
    let wanted = input.locator.trim();
    for (link, text) in links(input.tree) {
        if !text.is_empty() && text == wanted {
            if let Some(locator) = best_locator(input.tree, link) {
                out.push(Candidate::css(locator, 0.9, "hyperlink text exact match"));
            }
        }
    }
}
