//! Pluggable candidate sources consulted when local healing is not confident.
//!
//! A provider sees a PII-masked copy of the page and may propose anything;
//! whatever it returns is re-resolved against the real page by
//! [`validate_candidates`] before it can be ranked.

use tracing::debug;

use crate::candidate::Candidate;
use crate::context::HealingContext;
use crate::dom::{NodeId, Tree};
use crate::locator::element_locator;
use crate::result::HealResult;
use crate::similarity::token_similarity;

/// External candidate generator
pub trait CandidateProvider: std::fmt::Debug + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Propose candidates for a broken locator
    fn generate(
        &self,
        tree: &Tree,
        locator: &str,
        context: &HealingContext,
    ) -> HealResult<Vec<Candidate>>;
}

/// Keep candidates that resolve to at least one element, annotated with their
/// match count
#[must_use]
pub fn validate_candidates(candidates: Vec<Candidate>, tree: &Tree) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let count = tree
                .select_locator(&candidate.locator, candidate.locator_type)
                .len();
            if count == 0 {
                debug!(locator = %candidate.locator, "dropping provider candidate without matches");
                return None;
            }
            Some(candidate.with_validation_count(count))
        })
        .collect()
}

/// In-process provider that looks for buttons, ids and classes resembling the
/// broken locator
#[derive(Debug, Clone)]
pub struct PatternProvider {
    max_candidates: usize,
}

impl Default for PatternProvider {
    fn default() -> Self {
        Self { max_candidates: 5 }
    }
}

impl PatternProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    fn similar_buttons(tree: &Tree, locator: &str) -> Vec<Candidate> {
        Self::matching(tree, "button")
            .into_iter()
            .filter_map(|button| {
                let text = tree.text_trimmed(button);
                if text.chars().count() <= 2 {
                    return None;
                }
                let similarity = token_similarity(locator, &text);
                if similarity <= 0.3 {
                    return None;
                }
                let selector = element_locator(tree, button)?;
                Some(Candidate::css(
                    selector,
                    similarity * 0.8,
                    format!("pattern: similar button text ({similarity:.2})"),
                ))
            })
            .take(3)
            .collect()
    }

    fn similar_ids(tree: &Tree, locator: &str) -> Vec<Candidate> {
        tree.elements()
            .into_iter()
            .filter_map(|element| {
                let id = tree.attr_non_empty(element, "id")?;
                let similarity = token_similarity(locator, id);
                (similarity > 0.4).then(|| {
                    Candidate::css(
                        element_locator(tree, element).unwrap_or_else(|| format!("#{id}")),
                        similarity * 0.9,
                        format!("pattern: similar id ({similarity:.2})"),
                    )
                })
            })
            .take(2)
            .collect()
    }

    fn similar_classes(tree: &Tree, locator: &str) -> Vec<Candidate> {
        tree.elements()
            .into_iter()
            .flat_map(|element| tree.classes(element))
            .filter_map(|class| {
                let similarity = token_similarity(locator, class);
                (similarity > 0.4).then(|| {
                    Candidate::css(
                        format!(".{class}"),
                        similarity * 0.7,
                        format!("pattern: similar class ({similarity:.2})"),
                    )
                })
            })
            .take(2)
            .collect()
    }

    fn matching(tree: &Tree, tag: &str) -> Vec<NodeId> {
        tree.elements()
            .into_iter()
            .filter(|e| tree.tag_name(*e) == Some(tag))
            .collect()
    }
}

impl CandidateProvider for PatternProvider {
    fn name(&self) -> &str {
        "pattern"
    }

    fn generate(
        &self,
        tree: &Tree,
        locator: &str,
        _context: &HealingContext,
    ) -> HealResult<Vec<Candidate>> {
        let mut candidates = Vec::new();
        let patterns: [fn(&Tree, &str) -> Vec<Candidate>; 3] =
            [Self::similar_buttons, Self::similar_ids, Self::similar_classes];
        for pattern in patterns {
            candidates.extend(pattern(tree, locator));
            if candidates.len() >= self.max_candidates {
                break;
            }
        }
        candidates.truncate(self.max_candidates);
        Ok(candidates)
    }
}
