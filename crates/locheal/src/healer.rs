//! End-to-end healing of one broken locator.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: A candidate is only marked for automatic application when it
//!   is both confident and low-risk; everything else waits for a human
//! - **Mieruka**: Every score change is appended to the candidate's reason
//! - **Poka-Yoke**: Optional strategies (provider, rescorer) degrade to the
//!   local pipeline instead of failing the request

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::candidate::{merge_candidates, sort_by_score, Candidate};
use crate::config::HealConfig;
use crate::context::HealingContext;
use crate::dom::{parse, Tree};
use crate::heuristics::RuleEngine;
use crate::hierarchy::MovementSearch;
use crate::pii::{contains_contact_pii, mask_pii};
use crate::provider::{validate_candidates, CandidateProvider};
use crate::ranker::{apply_rescorer, Ranker, Rescorer};
use crate::result::HealResult;
use crate::verify::{annotate_risk, build_verify_action, VerifyAction, VerifyKind};

/// What the test was about to do with the element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealAction {
    Click,
    SendKeys,
    GetText,
    Submit,
    #[default]
    None,
    /// Any action this crate does not know
    #[serde(other)]
    Other,
}

impl HealAction {
    /// Verification suited to the action
    #[must_use]
    pub fn verify_kind(self, context: &HealingContext) -> VerifyKind {
        match self {
            Self::Click | Self::Submit => VerifyKind::ClickAndCheck,
            Self::GetText => VerifyKind::TextMatch {
                expected_text: context.visible_text.clone().unwrap_or_default(),
            },
            Self::SendKeys | Self::None | Self::Other => VerifyKind::Exists,
        }
    }
}

fn default_pii_masked() -> bool {
    true
}

/// One healing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealRequest {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub action: HealAction,
    pub page_html: String,
    /// Whether the caller already removed personal data from `page_html`
    #[serde(default = "default_pii_masked")]
    pub pii_masked: bool,
    #[serde(flatten)]
    pub context: HealingContext,
}

impl HealRequest {
    #[must_use]
    pub fn new(page_html: impl Into<String>, context: HealingContext) -> Self {
        Self {
            request_id: String::new(),
            action: HealAction::None,
            page_html: page_html.into(),
            pii_masked: true,
            context,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    #[must_use]
    pub const fn with_action(mut self, action: HealAction) -> Self {
        self.action = action;
        self
    }

    #[must_use]
    pub const fn with_pii_masked(mut self, pii_masked: bool) -> Self {
        self.pii_masked = pii_masked;
        self
    }
}

/// Outcome of a healing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealReport {
    pub request_id: String,
    /// Candidate marked for automatic application
    pub healed_locator: Option<Candidate>,
    /// Top candidates, best first, each carrying a risk score
    pub candidates: Vec<Candidate>,
    pub auto_apply_index: Option<usize>,
    pub verify_action: Option<VerifyAction>,
    pub warning: Option<String>,
    pub message: String,
}

/// Healing pipeline with its configuration and optional strategies
#[derive(Debug, Default)]
pub struct Healer {
    config: HealConfig,
    rescorer: Option<Box<dyn Rescorer>>,
    provider: Option<Box<dyn CandidateProvider>>,
}

impl Healer {
    /// Create a healer after validating the configuration
    pub fn new(config: HealConfig) -> HealResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rescorer: None,
            provider: None,
        })
    }

    #[must_use]
    pub fn with_rescorer(mut self, rescorer: impl Rescorer + 'static) -> Self {
        self.rescorer = Some(Box::new(rescorer));
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl CandidateProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    #[must_use]
    pub const fn config(&self) -> &HealConfig {
        &self.config
    }

    /// Heal one locator.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HealError::InvalidInput`] for blank HTML or a blank
    /// locator. Provider and rescorer failures are logged and skipped.
    pub fn heal(&self, request: &HealRequest) -> HealResult<HealReport> {
        let context = &request.context;
        context.validate()?;
        let tree = parse(&request.page_html)?;
        debug!(
            request_id = %request.request_id,
            locator = %context.original_locator,
            nodes = tree.len(),
            "healing request"
        );

        let warning = (!request.pii_masked && contains_contact_pii(&request.page_html))
            .then(|| "PII detected".to_string());

        let heuristic = RuleEngine::new(self.config.heuristics).generate(
            &tree,
            &context.original_locator,
            context.original_locator_type,
            Some(context),
        );
        let moved = MovementSearch::new(&tree, context)
            .with_weights(self.config.hierarchy)
            .find(self.config.max_moved_candidates);
        debug!(heuristic = heuristic.len(), moved = moved.len(), "raw candidates");

        let ranker = Ranker::new().with_weights(self.config.ranking);
        let mut ranked = ranker.rank(merge_candidates(heuristic.into_iter().chain(moved)), &tree, Some(context));

        let best = ranked.first().map_or(0.0, |c| c.score);
        if best < self.config.provider_trigger_score {
            if let Some(provider) = &self.provider {
                let extra = self.consult_provider(provider.as_ref(), request, &tree);
                if !extra.is_empty() {
                    let extra = ranker.rank(extra, &tree, Some(context));
                    ranked = merge_candidates(ranked.into_iter().chain(extra));
                    sort_by_score(&mut ranked);
                }
            }
        }

        if let Some(rescorer) = &self.rescorer {
            ranked = apply_rescorer(ranked, rescorer.as_ref(), self.config.ranking.model_blend);
        }

        ranked.truncate(self.config.top_k);
        let candidates = annotate_risk(ranked, &tree);

        let max_risk = self.config.safety.max_risk;
        let auto_apply_index = candidates.iter().position(|c| {
            c.risk_score.is_some_and(|r| r <= max_risk) && c.score >= self.config.auto_apply_min_score
        });
        let healed_locator = auto_apply_index.map(|i| candidates[i].clone());
        let verify_action = healed_locator
            .as_ref()
            .or_else(|| candidates.first())
            .map(|c| build_verify_action(c, &request.action.verify_kind(context)));

        let message = match (&healed_locator, candidates.len()) {
            (_, 0) => format!("no candidates found for '{}'", context.original_locator),
            (Some(healed), _) => format!(
                "healed '{}' to '{}' (score {:.2})",
                context.original_locator, healed.locator, healed.score
            ),
            (None, n) => format!("{n} candidates found, none safe to apply automatically"),
        };
        info!(request_id = %request.request_id, candidates = candidates.len(), auto_apply = ?auto_apply_index, "{message}");

        Ok(HealReport {
            request_id: request.request_id.clone(),
            healed_locator,
            candidates,
            auto_apply_index,
            verify_action,
            warning,
            message,
        })
    }

    fn consult_provider(
        &self,
        provider: &dyn CandidateProvider,
        request: &HealRequest,
        tree: &Tree,
    ) -> Vec<Candidate> {
        let masked = mask_pii(&request.page_html, &[]);
        let proposals = parse(&masked).and_then(|masked_tree| {
            provider.generate(&masked_tree, &request.context.original_locator, &request.context)
        });
        match proposals {
            Ok(proposals) => {
                let valid = validate_candidates(proposals, tree);
                debug!(provider = provider.name(), valid = valid.len(), "provider candidates");
                valid
            }
            Err(err) => {
                warn!(provider = provider.name(), error = %err, "candidate provider failed, continuing without it");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::candidate::FeatureRecord;
    use crate::locator::LocatorType;
    use crate::result::HealError;
    use crate::verify::VerifyActionType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(html: &str, locator: &str, locator_type: LocatorType) -> HealRequest {
        HealRequest::new(html, HealingContext::new(locator, locator_type))
    }

    #[derive(Debug)]
    struct StubProvider {
        calls: Arc<AtomicUsize>,
        proposals: Vec<Candidate>,
    }

    impl CandidateProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn generate(&self, _: &Tree, _: &str, _: &HealingContext) -> HealResult<Vec<Candidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.proposals.clone())
        }
    }

    #[derive(Debug)]
    struct BrokenProvider;

    impl CandidateProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        fn generate(&self, _: &Tree, _: &str, _: &HealingContext) -> HealResult<Vec<Candidate>> {
            Err(HealError::provider("service unavailable"))
        }
    }

    #[derive(Debug)]
    struct BrokenRescorer;

    impl Rescorer for BrokenRescorer {
        fn score(&self, _: &FeatureRecord) -> HealResult<f64> {
            Err(HealError::rescorer("model missing"))
        }
    }

    mod pipeline_tests {
        use super::*;

        #[test]
        fn test_heal_exact_id() {
            let healer = Healer::default();
            let report = healer
                .heal(
                    &request(
                        r#"<div><button id="login-btn">Sign in</button></div>"#,
                        "login-btn",
                        LocatorType::Id,
                    )
                    .with_request_id("r-1")
                    .with_action(HealAction::Click),
                )
                .unwrap();
            assert_eq!(report.request_id, "r-1");
            assert_eq!(report.auto_apply_index, Some(0));
            let healed = report.healed_locator.unwrap();
            assert_eq!(healed.locator, "#login-btn");
            assert_eq!(healed.risk_score, Some(0.0));
            let action = report.verify_action.unwrap();
            assert_eq!(action.action_type, VerifyActionType::ClickAndCheck);
            assert!(report.message.starts_with("healed"));
            assert!(report.warning.is_none());
        }

        #[test]
        fn test_heal_moved_button() {
            let html = r#"<div>
                <label>Username:</label><input id="username">
                <div id="modal"><div class="modal-content"><button id="login-btn">Login</button></div></div>
            </div>"#;
            let mut req = request(html, "#old-login", LocatorType::Css);
            req.context = req.context.with_anchors(["Username:"]);
            let report = Healer::default().heal(&req).unwrap();
            assert!(!report.candidates.is_empty());
            assert!(report.candidates.len() <= 5);
            assert!(report
                .candidates
                .iter()
                .any(|c| c.locator == "#login-btn" && c.reason.contains("anchor")));
            for pair in report.candidates.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }

        #[test]
        fn test_blank_html_is_invalid_input() {
            let err = Healer::default()
                .heal(&request("   ", "x", LocatorType::Id))
                .unwrap_err();
            assert!(matches!(err, HealError::InvalidInput { .. }));
            assert!(err.is_fatal());
        }

        #[test]
        fn test_auto_apply_requires_low_risk() {
            let html = r#"<form><button type="submit" id="delete-account">Delete account</button></form>"#;
            let report = Healer::default()
                .heal(&request(html, "delete-account", LocatorType::Id))
                .unwrap();
            assert!(!report.candidates.is_empty());
            assert!(report.auto_apply_index.is_none());
            assert!(report.healed_locator.is_none());
            assert!(report.candidates.iter().all(|c| c.risk_score.unwrap() >= 0.8));
        }

        #[test]
        fn test_top_k_and_risk_everywhere() {
            let html: String = (0..10)
                .map(|i| format!(r#"<button class="btn save" id="save-{i}">Save {i}</button>"#))
                .collect();
            let config = HealConfig::default().with_top_k(3);
            let report = Healer::new(config)
                .unwrap()
                .heal(&request(&html, "save", LocatorType::Id))
                .unwrap();
            assert!(report.candidates.len() <= 3);
            assert!(report.candidates.iter().all(|c| c.risk_score.is_some()));
        }

        #[test]
        fn test_pii_warning_only_when_unmasked() {
            let html = r#"<p>jane@example.com</p><button id="go">Go</button>"#;
            let masked = Healer::default()
                .heal(&request(html, "go", LocatorType::Id))
                .unwrap();
            assert!(masked.warning.is_none());
            let unmasked = Healer::default()
                .heal(&request(html, "go", LocatorType::Id).with_pii_masked(false))
                .unwrap();
            assert_eq!(unmasked.warning.as_deref(), Some("PII detected"));
        }

        #[test]
        fn test_invalid_config_rejected() {
            assert!(Healer::new(HealConfig::default().with_top_k(0)).is_err());
        }
    }

    mod strategy_tests {
        use super::*;

        #[test]
        fn test_provider_only_consulted_when_unsure() {
            let calls = Arc::new(AtomicUsize::new(0));
            let healer = Healer::default().with_provider(StubProvider {
                calls: Arc::clone(&calls),
                proposals: vec![
                    Candidate::css("#go", 0.6, "stub: go"),
                    Candidate::css("#nowhere", 0.9, "stub: nowhere"),
                ],
            });
            let html = r#"<div><button id="go">Go</button></div>"#;

            healer.heal(&request(html, "go", LocatorType::Id)).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 0);

            let report = healer.heal(&request(html, "qqq", LocatorType::Id)).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            let go = report.candidates.iter().find(|c| c.locator == "#go").unwrap();
            assert_eq!(go.validation_count, Some(1));
            assert!(report.candidates.iter().all(|c| c.locator != "#nowhere"));
        }

        #[test]
        fn test_failing_strategies_do_not_fail_heal() {
            let healer = Healer::default()
                .with_provider(BrokenProvider)
                .with_rescorer(BrokenRescorer);
            let html = r#"<div><button id="go">Go</button></div>"#;
            let report = healer.heal(&request(html, "qqq", LocatorType::Id)).unwrap();
            assert!(report.candidates.iter().all(|c| c.model_score.is_none()));

            let report = healer.heal(&request(html, "go", LocatorType::Id)).unwrap();
            assert_eq!(report.candidates[0].locator, "#go");
        }
    }

    mod wire_tests {
        use super::*;

        #[test]
        fn test_request_json_with_flattened_context() {
            let req: HealRequest = serde_json::from_str(
                r##"{
                    "request_id": "abc",
                    "original_locator": "#login",
                    "original_locator_type": "css",
                    "action": "double_click",
                    "page_html": "<button id='login'>Go</button>",
                    "anchors": ["Username:"],
                    "element_outer_html": "<button>Go</button>"
                }"##,
            )
            .unwrap();
            assert_eq!(req.action, HealAction::Other);
            assert!(req.pii_masked);
            assert_eq!(req.context.anchors, vec!["Username:".to_string()]);
            assert_eq!(req.context.old_subtree_html.as_deref(), Some("<button>Go</button>"));
        }

        #[test]
        fn test_verify_kind_follows_action() {
            let ctx = HealingContext::new("x", LocatorType::Css).with_visible_text("Total");
            assert_eq!(HealAction::Submit.verify_kind(&ctx), VerifyKind::ClickAndCheck);
            assert_eq!(
                HealAction::GetText.verify_kind(&ctx),
                VerifyKind::TextMatch {
                    expected_text: "Total".into()
                }
            );
            assert_eq!(HealAction::SendKeys.verify_kind(&ctx), VerifyKind::Exists);
        }
    }
}
