//! Healing configuration
//!
//! Every weight and threshold in the pipeline is an empirical default. They
//! live here so deployments can tune them from a YAML file without touching
//! the search code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::result::{HealError, HealResult};

/// Thresholds for the heuristic rule engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicThresholds {
    /// Minimum token Jaccard for the fuzzy id/class rule
    pub fuzzy_token: f64,
    /// Minimum sequence ratio for the visible-text rule
    pub visible_text: f64,
    /// Minimum length ratio for partial link text
    pub link_partial_ratio: f64,
    /// Minimum token Jaccard for the combined attribute rule
    pub combined: f64,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            fuzzy_token: 0.3,
            visible_text: 0.6,
            link_partial_ratio: 0.5,
            combined: 0.4,
        }
    }
}

/// Weights and thresholds for the hierarchy search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyWeights {
    pub anchor: f64,
    pub neighbor: f64,
    pub subtree: f64,
    pub heuristic: f64,
    /// Multiplier for locators matching exactly one element
    pub unique_boost: f64,
    /// Multiplier for visible elements
    pub visible_boost: f64,
    /// Penalty per level of `depth_diff` beyond two
    pub depth_penalty: f64,
    /// Minimum sequence ratio for a fuzzy anchor match
    pub fuzzy_anchor_threshold: f64,
    pub neighbor_threshold: f64,
    pub subtree_threshold: f64,
}

impl Default for HierarchyWeights {
    fn default() -> Self {
        Self {
            anchor: 0.4,
            neighbor: 0.3,
            subtree: 0.2,
            heuristic: 0.1,
            unique_boost: 1.2,
            visible_boost: 1.1,
            depth_penalty: 0.1,
            fuzzy_anchor_threshold: 0.8,
            neighbor_threshold: 0.1,
            subtree_threshold: 0.3,
        }
    }
}

/// Weights of the composite ranking score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub base_score: f64,
    pub uniqueness: f64,
    pub visibility: f64,
    pub depth_penalty: f64,
    pub structural: f64,
    pub similarity: f64,
    /// Share of the rescorer output in the blended score
    pub model_blend: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            base_score: 0.3,
            uniqueness: 0.25,
            visibility: 0.15,
            depth_penalty: 0.1,
            structural: 0.1,
            similarity: 0.1,
            model_blend: 0.7,
        }
    }
}

/// Safety limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Highest risk score a candidate may carry and still be applied
    pub max_risk: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self { max_risk: 0.3 }
    }
}

/// Full healing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    pub heuristics: HeuristicThresholds,
    pub hierarchy: HierarchyWeights,
    pub ranking: RankingWeights,
    pub safety: SafetyConfig,
    /// Candidates returned to the caller
    pub top_k: usize,
    /// Candidates kept from the hierarchy search
    pub max_moved_candidates: usize,
    /// The external provider is consulted when the best composite score is
    /// below this value
    pub provider_trigger_score: f64,
    /// Minimum score for a candidate to be marked for automatic application
    pub auto_apply_min_score: f64,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            heuristics: HeuristicThresholds::default(),
            hierarchy: HierarchyWeights::default(),
            ranking: RankingWeights::default(),
            safety: SafetyConfig::default(),
            top_k: 5,
            max_moved_candidates: 5,
            provider_trigger_score: 0.5,
            auto_apply_min_score: 0.6,
        }
    }
}

impl HealConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of candidates returned
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the hierarchy-search candidate limit
    #[must_use]
    pub const fn with_max_moved_candidates(mut self, max: usize) -> Self {
        self.max_moved_candidates = max;
        self
    }

    /// Set the maximum acceptable risk
    #[must_use]
    pub fn with_max_risk(mut self, max_risk: f64) -> Self {
        self.safety.max_risk = max_risk;
        self
    }

    /// Set the ranking weights
    #[must_use]
    pub fn with_ranking(mut self, ranking: RankingWeights) -> Self {
        self.ranking = ranking;
        self
    }

    /// Set the hierarchy weights
    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy: HierarchyWeights) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    /// Set the heuristic thresholds
    #[must_use]
    pub fn with_heuristics(mut self, heuristics: HeuristicThresholds) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> HealResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> HealResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> HealResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check every weight and threshold
    pub fn validate(&self) -> HealResult<()> {
        let unit = [
            ("heuristics.fuzzy_token", self.heuristics.fuzzy_token),
            ("heuristics.visible_text", self.heuristics.visible_text),
            ("heuristics.link_partial_ratio", self.heuristics.link_partial_ratio),
            ("heuristics.combined", self.heuristics.combined),
            ("hierarchy.anchor", self.hierarchy.anchor),
            ("hierarchy.neighbor", self.hierarchy.neighbor),
            ("hierarchy.subtree", self.hierarchy.subtree),
            ("hierarchy.heuristic", self.hierarchy.heuristic),
            ("hierarchy.depth_penalty", self.hierarchy.depth_penalty),
            ("hierarchy.fuzzy_anchor_threshold", self.hierarchy.fuzzy_anchor_threshold),
            ("hierarchy.neighbor_threshold", self.hierarchy.neighbor_threshold),
            ("hierarchy.subtree_threshold", self.hierarchy.subtree_threshold),
            ("ranking.base_score", self.ranking.base_score),
            ("ranking.uniqueness", self.ranking.uniqueness),
            ("ranking.visibility", self.ranking.visibility),
            ("ranking.depth_penalty", self.ranking.depth_penalty),
            ("ranking.structural", self.ranking.structural),
            ("ranking.similarity", self.ranking.similarity),
            ("ranking.model_blend", self.ranking.model_blend),
            ("safety.max_risk", self.safety.max_risk),
            ("provider_trigger_score", self.provider_trigger_score),
            ("auto_apply_min_score", self.auto_apply_min_score),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(HealError::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("hierarchy.unique_boost", self.hierarchy.unique_boost),
            ("hierarchy.visible_boost", self.hierarchy.visible_boost),
        ] {
            if !value.is_finite() || value < 1.0 {
                return Err(HealError::config(format!(
                    "{name} must be a finite multiplier >= 1, got {value}"
                )));
            }
        }
        if self.top_k == 0 {
            return Err(HealError::config("top_k must be at least 1"));
        }
        if self.max_moved_candidates == 0 {
            return Err(HealError::config("max_moved_candidates must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = HealConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 5);
        assert_eq!(config.safety.max_risk, 0.3);
        assert_eq!(config.hierarchy.anchor, 0.4);
        assert_eq!(config.ranking.uniqueness, 0.25);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = HealConfig::from_yaml_str("top_k: 3\nranking:\n  base_score: 0.5\n").unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.ranking.base_score, 0.5);
        assert_eq!(config.ranking.uniqueness, 0.25);
        assert_eq!(config.hierarchy, HierarchyWeights::default());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = HealConfig::from_yaml_str("safety:\n  max_risk: 1.5\n").unwrap_err();
        assert!(matches!(err, HealError::Config { .. }));
        assert!(err.to_string().contains("safety.max_risk"));

        let err = HealConfig::from_yaml_str("hierarchy:\n  unique_boost: 0.5\n").unwrap_err();
        assert!(err.to_string().contains("unique_boost"));

        assert!(HealConfig::default().with_top_k(0).validate().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_yaml_error() {
        let err = HealConfig::from_yaml_str("top_k: [").unwrap_err();
        assert!(matches!(err, HealError::Yaml(_)));
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let config = HealConfig::default().with_top_k(7).with_max_risk(0.2);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_yaml().unwrap().as_bytes()).unwrap();
        let loaded = HealConfig::from_path(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = HealConfig::from_path("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, HealError::Io(_)));
    }
}
