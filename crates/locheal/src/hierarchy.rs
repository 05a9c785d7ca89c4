//! Hierarchy and movement search.
//!
//! Finds elements that still exist but moved: wrapped in new containers,
//! pushed into a modal, split away from their old neighbours, or stripped of
//! the attributes the old locator relied on. Three independent signals feed
//! one [`FeatureRecord`] per hit:
//!
//! - anchors: stable text near the old position, searched breadth-first
//! - neighbours: the old previous/next sibling text
//! - subtree: token overlap with a snapshot of the old element
//!
//! All traversals are bounded by [`MAX_BFS_DEPTH`] and the sibling windows, so
//! the search always terminates without timeouts.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::candidate::{merge_candidates, sort_by_score, Candidate, FeatureRecord};
use crate::config::HierarchyWeights;
use crate::context::HealingContext;
use crate::dom::{parse_fragment, NodeId, Tree};
use crate::locator::{element_locator, full_css_path};
use crate::similarity::{jaccard, sequence_ratio, tokenize, TokenSet};

/// Element kinds a moved locator is expected to point at
pub const TARGET_TAGS: [&str; 7] = ["button", "input", "a", "span", "div", "select", "textarea"];

/// Deepest level explored below an anchor
pub const MAX_BFS_DEPTH: usize = 6;

/// Sibling positions inspected on each side of an anchor
pub const ANCHOR_SIBLING_WINDOW: usize = 5;

/// Sibling positions inspected on each side of a neighbour match
pub const NEIGHBOR_WINDOW: usize = 3;

fn is_target(tree: &Tree, node: NodeId) -> bool {
    tree.tag_name(node).is_some_and(|t| TARGET_TAGS.contains(&t))
}

/// Element found by one of the signals, before scoring
#[derive(Debug, Clone)]
struct Hit {
    node: NodeId,
    features: FeatureRecord,
    reason: String,
}

/// Movement search over one tree and context
#[derive(Debug)]
pub struct MovementSearch<'a> {
    tree: &'a Tree,
    context: &'a HealingContext,
    weights: HierarchyWeights,
    locator_tokens: TokenSet,
}

impl<'a> MovementSearch<'a> {
    #[must_use]
    pub fn new(tree: &'a Tree, context: &'a HealingContext) -> Self {
        Self {
            tree,
            context,
            weights: HierarchyWeights::default(),
            locator_tokens: tokenize(&context.original_locator),
        }
    }

    #[must_use]
    pub const fn with_weights(mut self, weights: HierarchyWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Run all signals and return at most `max_candidates`, best first
    #[must_use]
    pub fn find(&self, max_candidates: usize) -> Vec<Candidate> {
        let mut hits = self.anchor_hits();
        hits.extend(self.neighbor_hits());
        hits.extend(self.subtree_hits());
        debug!(hits = hits.len(), "hierarchy search collected hits");

        let candidates = hits.into_iter().filter_map(|hit| self.score_hit(hit));
        let mut candidates = merge_candidates(candidates);
        sort_by_score(&mut candidates);
        candidates.truncate(max_candidates);
        candidates
    }

    fn anchor_hits(&self) -> Vec<Hit> {
        let tree = self.tree;
        let mut hits = Vec::new();
        let text_nodes = tree.text_nodes();

        // reasons name anchors by position so their text never leaks into
        // risk checks on the reason
        for (index, anchor) in self.context.usable_anchors().enumerate() {
            let needle = anchor.to_lowercase();
            let mut exact: HashSet<NodeId> = HashSet::new();

            for &text_node in &text_nodes {
                let Some(text) = tree.text_value(text_node) else {
                    continue;
                };
                if !text.to_lowercase().contains(&needle) {
                    continue;
                }
                exact.insert(text_node);
                let Some(container) = tree.parent_element(text_node) else {
                    continue;
                };
                self.bfs(container, 1.0, None, &format!("exact anchor match #{index}"), &mut hits);
                self.anchor_siblings(container, index, &mut hits);
            }

            for &text_node in &text_nodes {
                if exact.contains(&text_node) {
                    continue;
                }
                let Some(text) = tree.text_value(text_node).map(str::trim) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                let ratio = sequence_ratio(&needle, &text.to_lowercase());
                if ratio <= self.weights.fuzzy_anchor_threshold {
                    continue;
                }
                if let Some(container) = tree.parent_element(text_node) {
                    self.bfs(
                        container,
                        ratio * 0.9,
                        None,
                        &format!("fuzzy anchor match #{index} ({ratio:.2})"),
                        &mut hits,
                    );
                }
            }
        }
        hits
    }

    fn anchor_siblings(&self, container: NodeId, anchor: usize, hits: &mut Vec<Hit>) {
        let (siblings, Some(position)) = self.tree.element_siblings(container) else {
            return;
        };
        let first = position.saturating_sub(ANCHOR_SIBLING_WINDOW);
        let last = (position + ANCHOR_SIBLING_WINDOW).min(siblings.len().saturating_sub(1));
        for (index, sibling) in siblings.iter().enumerate().take(last + 1).skip(first) {
            if index == position {
                continue;
            }
            let offset = index as i64 - position as i64;
            self.bfs(
                *sibling,
                1.0,
                Some(offset.unsigned_abs() as usize),
                &format!("exact anchor sibling #{anchor}, offset {offset}"),
                hits,
            );
        }
    }

    /// Breadth-first walk below `start`. The start node records
    /// `start_depth_diff` when given, deeper nodes their BFS depth.
    fn bfs(
        &self,
        start: NodeId,
        anchor_score: f64,
        start_depth_diff: Option<usize>,
        reason: &str,
        hits: &mut Vec<Hit>,
    ) {
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut visited: HashSet<NodeId> = HashSet::new();
        while let Some((node, depth)) = queue.pop_front() {
            if depth > MAX_BFS_DEPTH || !visited.insert(node) {
                continue;
            }
            if is_target(self.tree, node) {
                let depth_diff = match (depth, start_depth_diff) {
                    (0, Some(diff)) => diff,
                    _ => depth,
                };
                let reason = if start_depth_diff.is_some() && depth > 0 {
                    format!("{reason}, subtree depth {depth}")
                } else {
                    format!("{reason}, depth {depth_diff}")
                };
                hits.push(Hit {
                    node,
                    features: FeatureRecord {
                        anchor_match_score: anchor_score,
                        depth_diff,
                        ..FeatureRecord::default()
                    },
                    reason,
                });
            }
            for child in self.tree.element_children(node) {
                queue.push_back((child, depth + 1));
            }
        }
    }

    fn neighbor_hits(&self) -> Vec<Hit> {
        let mut hits = Vec::new();
        let sides = [
            ("prev", self.context.prev_sibling_text.as_deref()),
            ("next", self.context.next_sibling_text.as_deref()),
        ];
        for (side, text) in sides {
            let Some(needle) = text.map(str::trim).filter(|t| !t.is_empty()) else {
                continue;
            };
            let needle = needle.to_lowercase();
            for text_node in self.tree.text_nodes() {
                let matches = self
                    .tree
                    .text_value(text_node)
                    .is_some_and(|t| t.to_lowercase().contains(&needle));
                if !matches {
                    continue;
                }
                if let Some(container) = self.tree.parent_element(text_node) {
                    self.neighbor_window(container, side, &mut hits);
                }
            }
        }
        hits
    }

    fn neighbor_window(&self, container: NodeId, side: &str, hits: &mut Vec<Hit>) {
        let (siblings, Some(position)) = self.tree.element_siblings(container) else {
            return;
        };
        let first = position.saturating_sub(NEIGHBOR_WINDOW);
        let last = (position + NEIGHBOR_WINDOW).min(siblings.len().saturating_sub(1));
        for (index, sibling) in siblings.iter().enumerate().take(last + 1).skip(first) {
            if index == position {
                continue;
            }
            let tokens = tokenize(&self.tree.text_trimmed(*sibling));
            if tokens.is_empty() {
                continue;
            }
            let similarity = jaccard(&tokens, &self.locator_tokens);
            if similarity <= self.weights.neighbor_threshold {
                continue;
            }
            hits.push(Hit {
                node: *sibling,
                features: FeatureRecord {
                    neighbor_similarity: similarity,
                    depth_diff: index.abs_diff(position),
                    ..FeatureRecord::default()
                },
                reason: format!("neighbor {side} sibling match ({similarity:.2})"),
            });
        }
    }

    fn subtree_hits(&self) -> Vec<Hit> {
        let Some(old_html) = self
            .context
            .old_subtree_html
            .as_deref()
            .filter(|h| !h.trim().is_empty())
        else {
            return Vec::new();
        };
        let old_tree = match parse_fragment(old_html) {
            Ok(tree) => tree,
            Err(err) => {
                debug!(error = %err, "old subtree unusable, skipping subtree similarity");
                return Vec::new();
            }
        };
        let old_tokens = tokenize(&old_tree.text_trimmed(old_tree.root()));
        if old_tokens.is_empty() {
            return Vec::new();
        }

        self.tree
            .elements()
            .into_iter()
            .filter(|node| is_target(self.tree, *node))
            .filter_map(|node| {
                let tokens = tokenize(&self.tree.text_trimmed(node));
                if tokens.is_empty() {
                    return None;
                }
                let similarity = jaccard(&old_tokens, &tokens);
                (similarity > self.weights.subtree_threshold).then(|| Hit {
                    node,
                    features: FeatureRecord {
                        subtree_similarity: similarity,
                        ..FeatureRecord::default()
                    },
                    reason: format!("subtree similarity ({similarity:.2})"),
                })
            })
            .collect()
    }

    /// How well the element's own attributes echo the old locator
    fn heuristic_score(&self, node: NodeId) -> f64 {
        let tree = self.tree;
        let original = self.context.original_locator.as_str();
        let mut score = 0.0;
        if tree
            .attr_non_empty(node, "id")
            .is_some_and(|id| original.contains(id))
        {
            score += 0.3;
        }
        for class in tree.classes(node) {
            if original.contains(class) {
                score += 0.2;
            }
        }
        if tree
            .attr_non_empty(node, "name")
            .is_some_and(|name| original.contains(name))
        {
            score += 0.3;
        }
        let text = tree.text_trimmed(node);
        if !text.is_empty() {
            score += jaccard(&self.locator_tokens, &tokenize(&text)) * 0.2;
        }
        score.min(1.0)
    }

    /// Weighted signal sum with uniqueness and visibility boosts and the
    /// depth penalty
    #[must_use]
    pub fn aggregate(&self, features: &FeatureRecord) -> f64 {
        let w = &self.weights;
        let mut score = w.anchor * features.anchor_match_score
            + w.neighbor * features.neighbor_similarity
            + w.subtree * features.subtree_similarity
            + w.heuristic * features.heuristic_score;
        if features.uniqueness_count == 1 {
            score *= w.unique_boost;
        }
        if features.visible_flag {
            score *= w.visible_boost;
        }
        let penalty = features.depth_diff.saturating_sub(2) as f64 * w.depth_penalty;
        (score.min(1.0) - penalty).max(0.0)
    }

    fn score_hit(&self, hit: Hit) -> Option<Candidate> {
        let tree = self.tree;
        let simple = element_locator(tree, hit.node)?;
        let mut reason = hit.reason;
        let mut uniqueness = tree.count(&simple);
        let mut locator = simple;
        if uniqueness != 1 {
            let full = full_css_path(tree, hit.node)?;
            if let Some(relaxed) = relax_path(tree, &full) {
                let dropped = full.split_whitespace().count() - relaxed.split_whitespace().count();
                reason = format!("{reason}, relaxed path (dropped {dropped} leading segments)");
                locator = relaxed;
                uniqueness = 1;
            } else if tree.count(&full) == 1 {
                locator = full;
                uniqueness = 1;
            }
        }
        let features = FeatureRecord {
            uniqueness_count: uniqueness,
            depth: tree.depth(hit.node),
            visible_flag: tree.is_visible(hit.node),
            heuristic_score: self.heuristic_score(hit.node),
            ..hit.features
        };
        let score = self.aggregate(&features);
        Some(Candidate::css(locator, score, reason).with_features(features))
    }
}

/// Search with default weights
#[must_use]
pub fn find_moved_candidates(
    tree: &Tree,
    context: &HealingContext,
    max_candidates: usize,
) -> Vec<Candidate> {
    MovementSearch::new(tree, context).find(max_candidates)
}

/// Shortest proper suffix of a CSS descendant chain that matches exactly one
/// element.
///
/// Selector groups and XPath expressions are never relaxed.
#[must_use]
pub fn relax_path(tree: &Tree, locator: &str) -> Option<String> {
    // a group or an XPath has no descendant suffixes to drop
    if locator.contains(',') || locator.trim_start().starts_with('/') {
        return None;
    }
    let segments: Vec<&str> = locator.split_whitespace().collect();
    (1..segments.len())
        .rev()
        .map(|start| segments[start..].join(" "))
        .find(|suffix| tree.count(suffix) == 1)
}
