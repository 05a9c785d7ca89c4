//! Feature extraction and candidate ranking.
//!
//! Every candidate, whatever produced it, is re-resolved against the page and
//! described by the same [`FeatureRecord`]. The composite score fuses the
//! producer's raw score with uniqueness, visibility, depth, selector shape and
//! similarity. An optional [`Rescorer`] can then blend in a learned score.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::{clamp_unit, sort_by_score, Candidate, FeatureRecord};
use crate::config::RankingWeights;
use crate::context::HealingContext;
use crate::dom::{NodeId, Tree};
use crate::result::{HealError, HealResult};
use crate::similarity::{jaccard, sequence_ratio, tokenize, TokenSet};

// =============================================================================
// FEATURE EXTRACTION
// =============================================================================

/// Features of a candidate against the current page
#[must_use]
pub fn extract_features(candidate: &Candidate, tree: &Tree) -> FeatureRecord {
    extract_features_with_context(candidate, tree, None)
}

/// Features of a candidate, with `text_similarity` computed against the
/// context's remembered visible text when one is supplied
#[must_use]
pub fn extract_features_with_context(
    candidate: &Candidate,
    tree: &Tree,
    context: Option<&HealingContext>,
) -> FeatureRecord {
    let matches = tree.select_locator(&candidate.locator, candidate.locator_type);
    let Some(&first) = matches.first() else {
        return FeatureRecord::default();
    };

    let text_similarity = context
        .and_then(|ctx| ctx.visible_text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map_or(0.0, |expected| {
            sequence_ratio(&expected.to_lowercase(), &tree.text_trimmed(first).to_lowercase())
        });

    let record = FeatureRecord {
        uniqueness_count: matches.len(),
        depth: tree.depth(first),
        visible_flag: tree.is_visible(first),
        text_similarity,
        attribute_similarity: attribute_similarity(tree, first, &candidate.locator),
        structural_score: structural_score(&candidate.locator),
        ..FeatureRecord::default()
    };
    match &candidate.features {
        Some(previous) => record.with_hierarchy_signals(previous),
        None => record,
    }
}

/// Token overlap between a locator and the element's id, name, classes and
/// `data-*` values
#[must_use]
pub fn attribute_similarity(tree: &Tree, node: NodeId, locator: &str) -> f64 {
    let mut element_tokens = TokenSet::new();
    for name in ["id", "name"] {
        if let Some(value) = tree.attr_non_empty(node, name) {
            element_tokens.extend(tokenize(value));
        }
    }
    for class in tree.classes(node) {
        element_tokens.extend(tokenize(class));
    }
    for (name, value) in tree.attrs(node) {
        if name.starts_with("data-") {
            element_tokens.extend(tokenize(value));
        }
    }
    if element_tokens.is_empty() {
        return 0.0;
    }
    jaccard(&tokenize(locator), &element_tokens)
}

/// Selector-shape quality: short id/attribute/class selectors score highest
#[must_use]
pub fn structural_score(locator: &str) -> f64 {
    let mut score = if locator.starts_with('#') {
        0.8
    } else if locator.starts_with('.') {
        0.6
    } else if locator.contains('[') {
        0.7
    } else {
        0.4
    };
    let segments = locator.split_whitespace().count();
    score -= (segments as f64 * 0.1).min(0.5);
    if !locator.contains(' ') && !locator.contains(',') {
        score += 0.2;
    }
    clamp_unit(score)
}

/// 1 for a unique match, 0 for none, `1/count` otherwise
#[must_use]
pub fn uniqueness_score(count: usize) -> f64 {
    match count {
        0 => 0.0,
        n => 1.0 / n as f64,
    }
}

/// Shallow elements score higher
#[must_use]
pub fn depth_score(depth: usize) -> f64 {
    (1.0 - depth as f64 * 0.1).max(0.0)
}

// =============================================================================
// RANKER
// =============================================================================

/// Composite-score ranker
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker {
    weights: RankingWeights,
}

impl Ranker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_weights(mut self, weights: RankingWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Composite score for a raw score and its features
    #[must_use]
    pub fn composite(&self, raw_score: f64, features: &FeatureRecord) -> f64 {
        let w = &self.weights;
        let visible = if features.visible_flag { 1.0 } else { 0.0 };
        clamp_unit(
            w.base_score * raw_score
                + w.uniqueness * uniqueness_score(features.uniqueness_count)
                + w.visibility * visible
                + w.depth_penalty * depth_score(features.depth)
                + w.structural * features.structural_score
                + w.similarity * (features.text_similarity + features.attribute_similarity) / 2.0,
        )
    }

    /// Re-score and sort candidates, best first
    #[must_use]
    pub fn rank(
        &self,
        candidates: Vec<Candidate>,
        tree: &Tree,
        context: Option<&HealingContext>,
    ) -> Vec<Candidate> {
        let mut ranked: Vec<Candidate> = candidates
            .into_iter()
            .map(|candidate| {
                let features = extract_features_with_context(&candidate, tree, context);
                let score = self.composite(candidate.score, &features);
                candidate
                    .restaged(score, format!("ranked {score:.2}"))
                    .with_features(features)
            })
            .collect();
        sort_by_score(&mut ranked);
        debug!(count = ranked.len(), "ranked candidates");
        ranked
    }
}

/// Rank with explicit weights and no context
#[must_use]
pub fn rank(candidates: Vec<Candidate>, tree: &Tree, weights: &RankingWeights) -> Vec<Candidate> {
    Ranker::new().with_weights(*weights).rank(candidates, tree, None)
}

/// Rank with explicit weights, using the context for text similarity
#[must_use]
pub fn rank_with_context(
    candidates: Vec<Candidate>,
    tree: &Tree,
    weights: &RankingWeights,
    context: &HealingContext,
) -> Vec<Candidate> {
    Ranker::new()
        .with_weights(*weights)
        .rank(candidates, tree, Some(context))
}

// =============================================================================
// RESCORING
// =============================================================================

/// Learned scoring strategy applied after ranking
pub trait Rescorer: std::fmt::Debug + Send + Sync {
    /// Score one feature record; the result is expected in `[0, 1]`
    fn score(&self, features: &FeatureRecord) -> HealResult<f64>;
}

/// Blend rescorer output into ranked candidates.
///
/// `blended = model_blend * model + (1 - model_blend) * composite`. If the
/// rescorer fails or returns a non-finite value for any candidate, the whole
/// list is returned unchanged.
#[must_use]
pub fn apply_rescorer(
    candidates: Vec<Candidate>,
    rescorer: &dyn Rescorer,
    model_blend: f64,
) -> Vec<Candidate> {
    let mut model_scores = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let features = candidate.features.unwrap_or_default();
        match rescorer.score(&features) {
            Ok(score) if score.is_finite() => model_scores.push(score),
            Ok(score) => {
                warn!(locator = %candidate.locator, score, "rescorer returned a non-finite score, keeping composite scores");
                return candidates;
            }
            Err(err) => {
                warn!(error = %err, "rescorer failed, keeping composite scores");
                return candidates;
            }
        }
    }

    let mut blended: Vec<Candidate> = candidates
        .into_iter()
        .zip(model_scores)
        .map(|(candidate, model)| {
            let model = clamp_unit(model);
            let score = model_blend * model + (1.0 - model_blend) * candidate.score;
            candidate
                .restaged(score, format!("model {model:.2}"))
                .with_model_score(model)
        })
        .collect();
    sort_by_score(&mut blended);
    blended
}

/// Logistic model over named features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRescorer {
    #[serde(default)]
    pub bias: f64,
    pub weights: BTreeMap<String, f64>,
}

impl LinearRescorer {
    /// Build a model, rejecting unknown feature names and non-finite weights
    pub fn new(bias: f64, weights: BTreeMap<String, f64>) -> HealResult<Self> {
        let model = Self { bias, weights };
        model.validate()?;
        Ok(model)
    }

    /// Parse a model from JSON: `{"bias": .., "weights": {"<feature>": ..}}`
    pub fn from_json_str(json: &str) -> HealResult<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Load a model from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> HealResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> HealResult<()> {
        if !self.bias.is_finite() {
            return Err(HealError::rescorer("bias must be finite"));
        }
        for (name, weight) in &self.weights {
            if !FeatureRecord::NAMES.contains(&name.as_str()) {
                return Err(HealError::rescorer(format!("unknown feature `{name}`")));
            }
            if !weight.is_finite() {
                return Err(HealError::rescorer(format!("weight for `{name}` must be finite")));
            }
        }
        Ok(())
    }
}

impl Rescorer for LinearRescorer {
    fn score(&self, features: &FeatureRecord) -> HealResult<f64> {
        let logit = features
            .named_values()
            .filter_map(|(name, value)| self.weights.get(name).map(|w| w * value))
            .sum::<f64>()
            + self.bias;
        let score = 1.0 / (1.0 + (-logit).exp());
        if score.is_finite() {
            Ok(score)
        } else {
            Err(HealError::rescorer(format!("logit {logit} has no finite score")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::parse;
    use crate::locator::LocatorType;

    mod feature_tests {
        use super::*;

        #[test]
        fn test_features_of_unique_id() {
            let tree = parse(r#"<div><button id="login-btn" class="btn primary">Sign in</button></div>"#)
                .unwrap();
            let features = extract_features(&Candidate::css("#login-btn", 1.0, "id"), &tree);
            assert_eq!(features.uniqueness_count, 1);
            assert_eq!(features.depth, 1);
            assert!(features.visible_flag);
            assert!((features.structural_score - 0.9).abs() < 1e-9);
            assert_eq!(features.text_similarity, 0.0);
            // {#login, btn} vs {login, btn, primary}
            assert!((features.attribute_similarity - 0.25).abs() < 1e-9);
        }

        #[test]
        fn test_selector_prefix_stays_on_its_token() {
            let tree = parse(r#"<p class="note" data-role="save-note">x</p>"#).unwrap();
            let node = tree.select("p")[0];
            // ".note" never equals the bare class token
            assert_eq!(attribute_similarity(&tree, node, ".note"), 0.0);
            // {save, note} vs {note, save}
            assert_eq!(attribute_similarity(&tree, node, "save-note"), 1.0);
        }

        #[test]
        fn test_no_match_is_all_zero() {
            let tree = parse("<p>x</p>").unwrap();
            let features = extract_features(&Candidate::css("#missing", 0.9, "r"), &tree);
            assert_eq!(features, FeatureRecord::default());
            let invalid = extract_features(&Candidate::css("div[", 0.9, "r"), &tree);
            assert_eq!(invalid, FeatureRecord::default());
        }

        #[test]
        fn test_xpath_candidates_resolve() {
            let tree = parse(r#"<ul><li>a</li><li>b</li></ul>"#).unwrap();
            let candidate = Candidate::new("//li", LocatorType::Xpath, 0.5, "r");
            assert_eq!(extract_features(&candidate, &tree).uniqueness_count, 2);
        }

        #[test]
        fn test_hierarchy_signals_survive() {
            let tree = parse(r#"<button id="go">Go</button>"#).unwrap();
            let candidate = Candidate::css("#go", 0.5, "anchor").with_features(FeatureRecord {
                anchor_match_score: 1.0,
                depth_diff: 3,
                uniqueness_count: 99,
                ..FeatureRecord::default()
            });
            let features = extract_features(&candidate, &tree);
            assert_eq!(features.anchor_match_score, 1.0);
            assert_eq!(features.depth_diff, 3);
            assert_eq!(features.uniqueness_count, 1);
        }

        #[test]
        fn test_text_similarity_uses_context() {
            let tree = parse(r#"<button id="go">Sign in</button>"#).unwrap();
            let ctx = HealingContext::new("go", LocatorType::Id).with_visible_text("Sign In");
            let candidate = Candidate::css("#go", 0.5, "r");
            let features = extract_features_with_context(&candidate, &tree, Some(&ctx));
            assert_eq!(features.text_similarity, 1.0);
        }

        #[test]
        fn test_structural_score_shapes() {
            assert!((structural_score("#a") - 0.9).abs() < 1e-9);
            assert!((structural_score(".a") - 0.7).abs() < 1e-9);
            assert!((structural_score("[name=\"q\"]") - 0.8).abs() < 1e-9);
            assert!((structural_score("div") - 0.5).abs() < 1e-9);
            assert!((structural_score("div .a span") - 0.1).abs() < 1e-9);
            assert!((structural_score("a b c d e f g") - 0.0).abs() < 1e-9);
        }

        #[test]
        fn test_uniqueness_and_depth_transforms() {
            assert_eq!(uniqueness_score(0), 0.0);
            assert_eq!(uniqueness_score(1), 1.0);
            assert_eq!(uniqueness_score(4), 0.25);
            assert_eq!(depth_score(0), 1.0);
            assert_eq!(depth_score(12), 0.0);
        }
    }

    mod ranking_tests {
        use super::*;

        #[test]
        fn test_rank_orders_by_composite() {
            let tree = parse(
                r#"<div><button id="submit" class="btn">Submit</button><button class="btn">Other</button></div>"#,
            )
            .unwrap();
            let ranked = rank(
                vec![
                    Candidate::css(".btn", 0.9, "class"),
                    Candidate::css("#submit", 0.6, "id"),
                    Candidate::css("#gone", 1.0, "stale"),
                ],
                &tree,
                &RankingWeights::default(),
            );
            let order: Vec<_> = ranked.iter().map(|c| c.locator.as_str()).collect();
            assert_eq!(order, vec!["#submit", ".btn", "#gone"]);
            assert!(ranked.iter().all(|c| c.features.is_some()));
            assert!(ranked[0].reason.starts_with("id; ranked"));
            // only the raw score contributes for a locator that matches nothing
            assert!((ranked[2].score - 0.3).abs() < 1e-9);
        }

        #[test]
        fn test_composite_is_clamped() {
            let ranker = Ranker::new().with_weights(RankingWeights {
                base_score: 1.0,
                uniqueness: 1.0,
                ..RankingWeights::default()
            });
            let features = FeatureRecord {
                uniqueness_count: 1,
                ..FeatureRecord::default()
            };
            assert_eq!(ranker.composite(1.0, &features), 1.0);
        }
    }

    mod rescorer_tests {
        use super::*;

        #[derive(Debug)]
        struct Fixed(f64);

        impl Rescorer for Fixed {
            fn score(&self, features: &FeatureRecord) -> HealResult<f64> {
                Ok(self.0 * features.uniqueness_count as f64)
            }
        }

        #[derive(Debug)]
        struct Failing;

        impl Rescorer for Failing {
            fn score(&self, _: &FeatureRecord) -> HealResult<f64> {
                Err(HealError::rescorer("model unavailable"))
            }
        }

        fn ranked() -> Vec<Candidate> {
            vec![
                Candidate::css("#a", 0.8, "a").with_features(FeatureRecord::default()),
                Candidate::css("#b", 0.4, "b").with_features(FeatureRecord {
                    uniqueness_count: 1,
                    ..FeatureRecord::default()
                }),
            ]
        }

        #[test]
        fn test_blend_reorders() {
            let blended = apply_rescorer(ranked(), &Fixed(1.0), 0.7);
            assert_eq!(blended[0].locator, "#b");
            assert!((blended[0].score - (0.7 + 0.3 * 0.4)).abs() < 1e-9);
            assert_eq!(blended[0].model_score, Some(1.0));
            assert!((blended[1].score - 0.24).abs() < 1e-9);
        }

        #[test]
        fn test_failure_keeps_composite_for_whole_list() {
            let original = ranked();
            assert_eq!(apply_rescorer(original.clone(), &Failing, 0.7), original);
            assert_eq!(apply_rescorer(original.clone(), &Fixed(f64::NAN), 0.7), original);
        }

        #[test]
        fn test_linear_rescorer() {
            let model = LinearRescorer::from_json_str(
                r#"{"bias": -1.0, "weights": {"uniqueness_count": 2.0, "visible_flag": 1.0}}"#,
            )
            .unwrap();
            let features = FeatureRecord {
                uniqueness_count: 1,
                visible_flag: false,
                ..FeatureRecord::default()
            };
            let expected = 1.0 / (1.0 + (-1.0f64).exp());
            assert!((model.score(&features).unwrap() - expected).abs() < 1e-9);
            assert!((model.score(&FeatureRecord::default()).unwrap() - 0.2689).abs() < 1e-3);
        }

        #[test]
        fn test_linear_rescorer_rejects_unknown_feature() {
            let err = LinearRescorer::from_json_str(r#"{"weights": {"colour": 1.0}}"#).unwrap_err();
            assert!(matches!(err, HealError::Rescorer { .. }));
            assert!(LinearRescorer::from_json_str("{").is_err());
        }

        #[test]
        fn test_linear_rescorer_from_file() {
            use std::io::Write;
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(br#"{"bias": 0.0, "weights": {}}"#).unwrap();
            let model = LinearRescorer::from_path(file.path()).unwrap();
            assert_eq!(model.score(&FeatureRecord::default()).unwrap(), 0.5);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_composite_in_unit_range(
                raw in 0.0f64..=1.0,
                count in 0usize..20,
                depth in 0usize..40,
                visible: bool,
                structural in 0.0f64..=1.0,
                text in 0.0f64..=1.0,
                attr in 0.0f64..=1.0,
            ) {
                let features = FeatureRecord {
                    uniqueness_count: count,
                    depth,
                    visible_flag: visible,
                    structural_score: structural,
                    text_similarity: text,
                    attribute_similarity: attr,
                    ..FeatureRecord::default()
                };
                let score = Ranker::new().composite(raw, &features);
                prop_assert!((0.0..=1.0).contains(&score));
            }

            #[test]
            fn prop_structural_score_in_unit_range(locator in "[#.a-z \\[\\]=,]{0,40}") {
                prop_assert!((0.0..=1.0).contains(&structural_score(&locator)));
            }
        }
    }
}
