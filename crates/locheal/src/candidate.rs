//! Candidate replacement locators and their feature records.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::locator::LocatorType;

/// Clamp a score into `[0, 1]`, mapping NaN to 0
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Fixed-shape signal record attached to a candidate.
///
/// The last five fields are only populated by the hierarchy search and stay
/// zero for every other source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureRecord {
    /// Number of elements the locator matches
    pub uniqueness_count: usize,
    /// Depth of the first match below the document
    pub depth: usize,
    /// Whether the first match renders
    pub visible_flag: bool,
    /// Sequence similarity of expected vs actual text
    pub text_similarity: f64,
    /// Token overlap of locator vs element attributes
    pub attribute_similarity: f64,
    /// Selector-form quality
    pub structural_score: f64,
    pub anchor_match_score: f64,
    pub neighbor_similarity: f64,
    pub subtree_similarity: f64,
    pub depth_diff: usize,
    pub heuristic_score: f64,
}

impl FeatureRecord {
    /// Feature names in the order of [`FeatureRecord::values`]
    pub const NAMES: [&'static str; 11] = [
        "uniqueness_count",
        "depth",
        "visible_flag",
        "text_similarity",
        "attribute_similarity",
        "structural_score",
        "anchor_match_score",
        "neighbor_similarity",
        "subtree_similarity",
        "depth_diff",
        "heuristic_score",
    ];

    /// Numeric view, booleans as 0/1
    #[must_use]
    pub fn values(&self) -> [f64; 11] {
        [
            self.uniqueness_count as f64,
            self.depth as f64,
            if self.visible_flag { 1.0 } else { 0.0 },
            self.text_similarity,
            self.attribute_similarity,
            self.structural_score,
            self.anchor_match_score,
            self.neighbor_similarity,
            self.subtree_similarity,
            self.depth_diff as f64,
            self.heuristic_score,
        ]
    }

    /// Name/value pairs
    pub fn named_values(&self) -> impl Iterator<Item = (&'static str, f64)> {
        Self::NAMES.into_iter().zip(self.values())
    }

    /// Copy the hierarchy-search signals from `other`
    #[must_use]
    pub fn with_hierarchy_signals(mut self, other: &Self) -> Self {
        self.anchor_match_score = other.anchor_match_score;
        self.neighbor_similarity = other.neighbor_similarity;
        self.subtree_similarity = other.subtree_similarity;
        self.depth_diff = other.depth_diff;
        self.heuristic_score = other.heuristic_score;
        self
    }
}

/// A proposed replacement locator.
///
/// Stages never mutate a candidate in place: each `with_*` call consumes the
/// value and returns the next stage's version, and [`Candidate::restaged`]
/// appends to `reason` so the provenance of every score stays readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub locator: String,
    #[serde(rename = "type")]
    pub locator_type: LocatorType,
    pub score: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_count: Option<usize>,
    /// Raw output of a learned rescorer, when one ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_score: Option<f64>,
}

impl Candidate {
    /// Create a candidate; the score is clamped into `[0, 1]`
    #[must_use]
    pub fn new(
        locator: impl Into<String>,
        locator_type: LocatorType,
        score: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            locator: locator.into(),
            locator_type,
            score: clamp_unit(score),
            reason: reason.into(),
            features: None,
            risk_score: None,
            validation_count: None,
            model_score: None,
        }
    }

    /// CSS candidate
    #[must_use]
    pub fn css(locator: impl Into<String>, score: f64, reason: impl Into<String>) -> Self {
        Self::new(locator, LocatorType::Css, score, reason)
    }

    #[must_use]
    pub fn with_features(mut self, features: FeatureRecord) -> Self {
        self.features = Some(features);
        self
    }

    #[must_use]
    pub fn with_risk_score(mut self, risk: f64) -> Self {
        self.risk_score = Some(clamp_unit(risk));
        self
    }

    #[must_use]
    pub fn with_validation_count(mut self, count: usize) -> Self {
        self.validation_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_model_score(mut self, model_score: f64) -> Self {
        self.model_score = Some(clamp_unit(model_score));
        self
    }

    /// Next-stage version with a new score and a note appended to `reason`
    #[must_use]
    pub fn restaged(mut self, score: f64, note: impl AsRef<str>) -> Self {
        self.score = clamp_unit(score);
        let note = note.as_ref();
        if !note.is_empty() {
            if self.reason.is_empty() {
                self.reason = note.to_string();
            } else {
                self.reason = format!("{}; {note}", self.reason);
            }
        }
        self
    }

    /// Identity used for de-duplication
    #[must_use]
    pub fn key(&self) -> (&str, LocatorType) {
        (self.locator.as_str(), self.locator_type)
    }

    /// Descending score order
    #[must_use]
    pub fn by_score_desc(a: &Self, b: &Self) -> Ordering {
        b.score.total_cmp(&a.score)
    }
}

/// Stable sort by descending score; ties keep discovery order
pub fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(Candidate::by_score_desc);
}

/// Merge candidate lists, keeping one candidate per `(locator, type)`.
///
/// The highest-scoring duplicate wins; its position is that of the first
/// occurrence.
#[must_use]
pub fn merge_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::new();
    let mut positions: HashMap<(String, LocatorType), usize> = HashMap::new();
    for candidate in candidates {
        let key = (candidate.locator.clone(), candidate.locator_type);
        match positions.get(&key) {
            Some(&index) => {
                if candidate.score > merged[index].score {
                    merged[index] = candidate;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}
