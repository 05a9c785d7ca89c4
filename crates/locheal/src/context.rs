//! Healing context: what the caller remembers about the broken element.

use serde::{Deserialize, Serialize};

use crate::locator::LocatorType;
use crate::result::{HealError, HealResult};

/// Read-only hints supplied once per healing request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingContext {
    /// The locator that stopped resolving
    pub original_locator: String,
    /// Strategy of the original locator
    #[serde(default, alias = "type")]
    pub original_locator_type: LocatorType,
    /// Stable text fragments that used to sit near the element
    #[serde(default)]
    pub anchors: Vec<String>,
    /// Text of the element's former previous sibling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sibling_text: Option<String>,
    /// Text of the element's former next sibling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sibling_text: Option<String>,
    /// Snapshot of the element's old outer HTML
    #[serde(
        default,
        alias = "element_outer_html",
        skip_serializing_if = "Option::is_none"
    )]
    pub old_subtree_html: Option<String>,
    /// Text the element used to display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_text: Option<String>,
}

impl HealingContext {
    /// Context with only the original locator filled in
    #[must_use]
    pub fn new(original_locator: impl Into<String>, original_locator_type: LocatorType) -> Self {
        Self {
            original_locator: original_locator.into(),
            original_locator_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_anchors<I, S>(mut self, anchors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.anchors = anchors.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_prev_sibling_text(mut self, text: impl Into<String>) -> Self {
        self.prev_sibling_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_next_sibling_text(mut self, text: impl Into<String>) -> Self {
        self.next_sibling_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_old_subtree_html(mut self, html: impl Into<String>) -> Self {
        self.old_subtree_html = Some(html.into());
        self
    }

    #[must_use]
    pub fn with_visible_text(mut self, text: impl Into<String>) -> Self {
        self.visible_text = Some(text.into());
        self
    }

    /// Anchors with blank entries removed
    pub fn usable_anchors(&self) -> impl Iterator<Item = &str> {
        self.anchors
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
    }

    /// Reject a context whose locator is blank
    pub fn validate(&self) -> HealResult<()> {
        if self.original_locator.trim().is_empty() {
            return Err(HealError::invalid_input("original locator cannot be empty"));
        }
        Ok(())
    }
}
