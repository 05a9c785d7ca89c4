//! Locheal: self-healing locators for UI tests
//!
//! When a CSS, XPath, id or name locator stops resolving against a page,
//! Locheal proposes ranked replacement locators, each with a plausibility
//! score, a risk score and a verification action for the test runner.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        LOCHEAL Pipeline                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐                               │
//! │   │ Heuristic  │    │ Hierarchy  │                               │
//! │   │ Rules      │    │ Search     │                               │
//! │   └─────┬──────┘    └─────┬──────┘                               │
//! │         └──────┬──────────┘                                      │
//! │          ┌─────▼──────┐    ┌────────────┐    ┌────────────┐      │
//! │          │ Ranker     │───►│ Rescorer / │───►│ Safety     │      │
//! │          │ (features) │    │ Provider   │    │ (risk)     │      │
//! │          └────────────┘    └────────────┘    └────────────┘      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use locheal::prelude::*;
//!
//! let context = HealingContext::new("login-btn", LocatorType::Id);
//! let request = HealRequest::new(r#"<button id="login-btn">Sign in</button>"#, context);
//! let report = Healer::default().heal(&request).unwrap();
//! assert_eq!(report.candidates[0].locator, "#login-btn");
//! ```

#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod candidate;
pub mod config;
pub mod context;
pub mod dom;
pub mod healer;
pub mod heuristics;
pub mod hierarchy;
pub mod locator;
pub mod pii;
pub mod provider;
pub mod ranker;
mod result;
pub mod selector;
pub mod similarity;
pub mod verify;

pub use candidate::{merge_candidates, sort_by_score, Candidate, FeatureRecord};
pub use config::{HealConfig, HeuristicThresholds, HierarchyWeights, RankingWeights, SafetyConfig};
pub use context::HealingContext;
pub use dom::{parse, parse_fragment, NodeId, Tree};
pub use healer::{HealAction, HealReport, HealRequest, Healer};
pub use heuristics::RuleEngine;
pub use hierarchy::{find_moved_candidates, relax_path, MovementSearch};
pub use locator::{Locator, LocatorType};
pub use pii::{detect_pii, mask_pii, PiiRule};
pub use provider::{validate_candidates, CandidateProvider, PatternProvider};
pub use ranker::{
    apply_rescorer, extract_features, rank, rank_with_context, LinearRescorer, Ranker, Rescorer,
};
pub use result::{HealError, HealResult};
pub use verify::{
    build_verify_action, calculate_risk_score, filter_safe, is_destructive, verify_locator_exists,
    ExistenceReport, VerifyAction, VerifyKind,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::candidate::*;
    pub use super::config::*;
    pub use super::context::*;
    pub use super::healer::*;
    pub use super::hierarchy::{find_moved_candidates, MovementSearch};
    pub use super::locator::{Locator, LocatorType};
    pub use super::pii::*;
    pub use super::provider::*;
    pub use super::ranker::*;
    pub use super::result::*;
    pub use super::verify::*;
    pub use super::{parse, Tree};
}
