//! Safety and verification for healed locators.
//!
//! A plausible candidate can still be a dangerous one: a locator that drifted
//! from "Save" onto "Delete account" scores well on similarity. This module
//! estimates that risk and describes how a runner should confirm a candidate
//! before trusting it.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: Risky candidates are stopped before they are auto-applied
//! - **Poka-Yoke**: Verify actions are typed, so a runner cannot receive a
//!   malformed check
//! - **Genchi Genbutsu**: Risk is measured against the live page, not the
//!   candidate's own claims

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::{clamp_unit, Candidate};
use crate::dom::Tree;
use crate::locator::LocatorType;
use crate::result::{HealError, HealResult};

/// Phrases that mark an element or a candidate as destructive
pub const DESTRUCTIVE_KEYWORDS: [&str; 7] = [
    "delete",
    "remove",
    "confirm purchase",
    "submit payment",
    "unsubscribe",
    "cancel account",
    "delete account",
];

/// Words that make a submit control or a form action destructive
const DESTRUCTIVE_VERBS: [&str; 3] = ["delete", "remove", "cancel"];

/// Default maximum acceptable risk
pub const DEFAULT_MAX_RISK: f64 = 0.3;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// =============================================================================
// RISK
// =============================================================================

/// Whether applying the candidate could trigger a destructive action.
///
/// Checks the candidate's reason, then the first element it resolves to.
/// A candidate that resolves to nothing is not destructive.
#[must_use]
pub fn is_destructive(candidate: &Candidate, tree: &Tree) -> bool {
    if contains_any(&candidate.reason.to_lowercase(), &DESTRUCTIVE_KEYWORDS) {
        return true;
    }
    let Some(&element) = tree
        .select_locator(&candidate.locator, candidate.locator_type)
        .first()
    else {
        return false;
    };

    let text = tree.text_trimmed(element).to_lowercase();
    if contains_any(&text, &DESTRUCTIVE_KEYWORDS) {
        return true;
    }

    let tag = tree.tag_name(element).unwrap_or_default();
    if matches!(tag, "button" | "input") {
        let kind = tree.attr(element, "type").unwrap_or_default().to_lowercase();
        if matches!(kind.as_str(), "submit" | "reset") {
            let label = match tree.attr(element, "value") {
                Some(value) => format!("{text} {}", value.to_lowercase()),
                None => text,
            };
            if contains_any(&label, &DESTRUCTIVE_VERBS) {
                return true;
            }
        }
    }

    if tag == "form" {
        let action = tree.attr(element, "action").unwrap_or_default().to_lowercase();
        if contains_any(&action, &DESTRUCTIVE_VERBS) {
            return true;
        }
    }
    false
}

/// Risk of applying a candidate, in `[0, 1]`
#[must_use]
pub fn calculate_risk_score(candidate: &Candidate, tree: &Tree) -> f64 {
    let mut risk = 0.0;
    if is_destructive(candidate, tree) {
        risk += 0.8;
    }
    match tree.try_select_locator(&candidate.locator, candidate.locator_type) {
        Ok(matches) if matches.is_empty() => risk += 1.0,
        Ok(matches) if matches.len() > 1 => risk += 0.3,
        Ok(_) => {}
        Err(err) => {
            debug!(error = %err, "candidate locator does not parse");
            risk += 0.5;
        }
    }
    if candidate.locator.split_whitespace().count() > 3 {
        risk += 0.2;
    }
    if candidate.score < 0.5 {
        risk += 0.1;
    }
    clamp_unit(risk)
}

/// Attach a risk score to every candidate, keeping order
#[must_use]
pub fn annotate_risk(candidates: Vec<Candidate>, tree: &Tree) -> Vec<Candidate> {
    candidates
        .into_iter()
        .map(|c| {
            let risk = calculate_risk_score(&c, tree);
            c.with_risk_score(risk)
        })
        .collect()
}

/// Candidates whose risk is at most `max_risk`, annotated with it
#[must_use]
pub fn filter_safe(candidates: Vec<Candidate>, tree: &Tree, max_risk: f64) -> Vec<Candidate> {
    annotate_risk(candidates, tree)
        .into_iter()
        .filter(|c| c.risk_score.is_some_and(|r| r <= max_risk))
        .collect()
}

// =============================================================================
// VERIFY ACTIONS
// =============================================================================

/// Wire tag of a verify action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyActionType {
    Exists,
    ClickAndCheck,
    TextMatch,
    Custom,
}

/// Requested kind of verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyKind {
    /// Locator matches exactly one element
    Exists,
    /// Clicking the element raises no error
    ClickAndCheck,
    /// Element shows the expected text
    TextMatch { expected_text: String },
    /// Runner-defined check
    Custom(String),
}

impl FromStr for VerifyKind {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(HealError::invalid_input("verify kind cannot be empty")),
            "exists" => Ok(Self::Exists),
            "click_and_check" => Ok(Self::ClickAndCheck),
            "text_match" => Ok(Self::TextMatch {
                expected_text: String::new(),
            }),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

/// Kind-specific verify parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerifyDetails {
    Exists {
        description: String,
        expected_count: usize,
        timeout_ms: u64,
        retries: u32,
    },
    ClickAndCheck {
        description: String,
        timeout_ms: u64,
        expected_url_change: bool,
        error_selectors: Vec<String>,
    },
    TextMatch {
        description: String,
        expected_text: String,
        partial_match: bool,
    },
    Custom {
        description: String,
        action: String,
    },
}

/// Instruction for a runner to confirm a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyAction {
    #[serde(rename = "type")]
    pub action_type: VerifyActionType,
    pub locator: String,
    pub locator_type: LocatorType,
    pub details: VerifyDetails,
}

/// Build the verify action for a candidate
#[must_use]
pub fn build_verify_action(candidate: &Candidate, kind: &VerifyKind) -> VerifyAction {
    let (action_type, details) = match kind {
        VerifyKind::Exists => (
            VerifyActionType::Exists,
            VerifyDetails::Exists {
                description: "Verify that the locator matches exactly one element".to_string(),
                expected_count: 1,
                timeout_ms: 5000,
                retries: 2,
            },
        ),
        VerifyKind::ClickAndCheck => (
            VerifyActionType::ClickAndCheck,
            VerifyDetails::ClickAndCheck {
                description: "Click the element and verify no error occurs".to_string(),
                timeout_ms: 10_000,
                expected_url_change: false,
                error_selectors: [".error", ".alert", "[class*='error']"]
                    .map(String::from)
                    .to_vec(),
            },
        ),
        VerifyKind::TextMatch { expected_text } => (
            VerifyActionType::TextMatch,
            VerifyDetails::TextMatch {
                description: "Verify element contains expected text".to_string(),
                expected_text: expected_text.clone(),
                partial_match: true,
            },
        ),
        VerifyKind::Custom(action) => (
            VerifyActionType::Custom,
            VerifyDetails::Custom {
                description: format!("Custom verification: {action}"),
                action: action.clone(),
            },
        ),
    };
    VerifyAction {
        action_type,
        locator: candidate.locator.clone(),
        locator_type: candidate.locator_type,
        details,
    }
}

// =============================================================================
// EXISTENCE REPORT
// =============================================================================

/// Maximum characters of element text in an existence report
const SUMMARY_TEXT_CHARS: usize = 50;

/// Short description of a matched element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    pub text: String,
}

/// What a locator resolves to on the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistenceReport {
    pub exists: bool,
    pub count: usize,
    /// First three matches
    pub elements: Vec<ElementSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolve a locator and summarise the matches
#[must_use]
pub fn verify_locator_exists(tree: &Tree, locator: &str, locator_type: LocatorType) -> ExistenceReport {
    match tree.try_select_locator(locator, locator_type) {
        Ok(matches) => ExistenceReport {
            exists: !matches.is_empty(),
            count: matches.len(),
            elements: matches
                .iter()
                .take(3)
                .map(|&node| ElementSummary {
                    tag: tree.tag_name(node).unwrap_or_default().to_string(),
                    text: tree.text_trimmed(node).chars().take(SUMMARY_TEXT_CHARS).collect(),
                })
                .collect(),
            error: None,
        },
        Err(err) => ExistenceReport {
            exists: false,
            count: 0,
            elements: Vec::new(),
            error: Some(err.to_string()),
        },
    }
}

/// Parse a verify kind, defaulting blank input to `exists`
pub fn parse_verify_kind(kind: Option<&str>) -> HealResult<VerifyKind> {
    match kind.map(str::trim) {
        None | Some("") => Ok(VerifyKind::Exists),
        Some(kind) => kind.parse(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::parse;

    mod destructive_tests {
        use super::*;

        #[test]
        fn test_submit_delete_account_is_destructive() {
            let tree = parse(r#"<button type="submit" id="x">Delete Account</button>"#).unwrap();
            assert!(is_destructive(&Candidate::css("#x", 0.9, "id"), &tree));
        }

        #[test]
        fn test_save_changes_is_safe() {
            let tree = parse(r#"<button type="submit" id="x">Save Changes</button>"#).unwrap();
            assert!(!is_destructive(&Candidate::css("#x", 0.9, "id"), &tree));
        }

        #[test]
        fn test_reason_keyword() {
            let tree = parse("<p>x</p>").unwrap();
            let candidate = Candidate::css("#nothing", 0.9, "link text 'Remove item'");
            assert!(is_destructive(&candidate, &tree));
        }

        #[test]
        fn test_submit_input_value() {
            let tree = parse(r#"<input type="reset" id="r" value="Cancel order">"#).unwrap();
            assert!(is_destructive(&Candidate::css("#r", 0.9, "id"), &tree));
            let tree = parse(r#"<input type="text" id="r" value="Cancel order">"#).unwrap();
            assert!(!is_destructive(&Candidate::css("#r", 0.9, "id"), &tree));
        }

        #[test]
        fn test_form_action() {
            let tree = parse(r#"<form id="f" action="/account/cancel"><input></form>"#).unwrap();
            assert!(is_destructive(&Candidate::css("#f", 0.9, "id"), &tree));
        }

        #[test]
        fn test_unresolvable_is_not_destructive() {
            let tree = parse("<p>Delete</p>").unwrap();
            assert!(!is_destructive(&Candidate::css("#missing", 0.9, "id"), &tree));
            assert!(!is_destructive(&Candidate::css("p[", 0.9, "broken"), &tree));
        }
    }

    mod risk_tests {
        use super::*;

        #[test]
        fn test_risk_components() {
            let tree = parse(
                r#"<div><button id="save">Save</button><a class="l">a</a><a class="l">b</a></div>"#,
            )
            .unwrap();
            let risk = |locator: &str, score: f64| {
                calculate_risk_score(&Candidate::css(locator, score, "r"), &tree)
            };
            assert_eq!(risk("#save", 0.9), 0.0);
            assert!((risk(".l", 0.9) - 0.3).abs() < 1e-9);
            assert!((risk(".l", 0.2) - 0.4).abs() < 1e-9);
            assert_eq!(risk("#missing", 0.9), 1.0);
            assert!((risk("div[", 0.9) - 0.5).abs() < 1e-9);
            assert!((risk("div div div #save", 0.9) - 1.0).abs() < 1e-9);
            assert!((risk("div > div #save", 0.9) - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_long_unique_path() {
            let tree = parse(r#"<main><div><section><button id="b">Go</button></section></div></main>"#)
                .unwrap();
            let candidate = Candidate::css("main div section #b", 0.9, "path");
            assert!((calculate_risk_score(&candidate, &tree) - 0.2).abs() < 1e-9);
        }

        #[test]
        fn test_filter_safe_respects_limit() {
            let tree = parse(
                r#"<button id="save">Save</button><button type="submit" id="del">Delete</button>"#,
            )
            .unwrap();
            let safe = filter_safe(
                vec![
                    Candidate::css("#save", 0.9, "id"),
                    Candidate::css("#del", 0.9, "id"),
                    Candidate::css("button", 0.9, "tag"),
                ],
                &tree,
                DEFAULT_MAX_RISK,
            );
            assert_eq!(safe.len(), 2);
            assert!(safe.iter().all(|c| c.risk_score.unwrap() <= DEFAULT_MAX_RISK));
            assert_eq!(safe[0].locator, "#save");
        }
    }

    mod verify_action_tests {
        use super::*;

        #[test]
        fn test_exists_shape() {
            let action = build_verify_action(&Candidate::css("#a", 0.9, "r"), &VerifyKind::Exists);
            let json = serde_json::to_value(&action).unwrap();
            assert_eq!(json["type"], "exists");
            assert_eq!(json["locator_type"], "css");
            assert_eq!(json["details"]["expected_count"], 1);
            assert_eq!(json["details"]["timeout_ms"], 5000);
            assert_eq!(json["details"]["retries"], 2);
        }

        #[test]
        fn test_click_and_check_round_trips() {
            let action =
                build_verify_action(&Candidate::css("#a", 0.9, "r"), &VerifyKind::ClickAndCheck);
            let json = serde_json::to_string(&action).unwrap();
            let back: VerifyAction = serde_json::from_str(&json).unwrap();
            assert_eq!(back, action);
            let VerifyDetails::ClickAndCheck {
                error_selectors,
                expected_url_change,
                ..
            } = back.details
            else {
                panic!("wrong details");
            };
            assert_eq!(error_selectors.len(), 3);
            assert!(!expected_url_change);
        }

        #[test]
        fn test_kind_parsing() {
            assert_eq!(parse_verify_kind(None).unwrap(), VerifyKind::Exists);
            assert_eq!(
                "text_match".parse::<VerifyKind>().unwrap(),
                VerifyKind::TextMatch {
                    expected_text: String::new()
                }
            );
            assert_eq!(
                "hover".parse::<VerifyKind>().unwrap(),
                VerifyKind::Custom("hover".into())
            );
            let action = build_verify_action(
                &Candidate::css("#a", 0.9, "r"),
                &VerifyKind::Custom("hover".into()),
            );
            assert_eq!(action.action_type, VerifyActionType::Custom);
        }
    }

    mod existence_tests {
        use super::*;

        #[test]
        fn test_report_lists_first_three() {
            let long = "x".repeat(80);
            let html = format!("<ul><li>{long}</li><li>b</li><li>c</li><li>d</li></ul>");
            let tree = parse(&html).unwrap();
            let report = verify_locator_exists(&tree, "li", LocatorType::Css);
            assert!(report.exists);
            assert_eq!(report.count, 4);
            assert_eq!(report.elements.len(), 3);
            assert_eq!(report.elements[0].text.chars().count(), 50);
            assert_eq!(report.elements[1].tag, "li");

            let report = verify_locator_exists(&tree, "//li[2]", LocatorType::Xpath);
            assert_eq!(report.count, 1);
        }

        #[test]
        fn test_report_carries_error() {
            let tree = parse("<p>x</p>").unwrap();
            let report = verify_locator_exists(&tree, "p[", LocatorType::Css);
            assert!(!report.exists);
            assert!(report.error.is_some());
            let json = serde_json::to_value(&report).unwrap();
            assert!(json.get("error").is_some());
        }
    }
}
