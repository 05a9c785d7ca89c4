//! Detection and masking of personal data in page HTML.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::result::HealError;

static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok()
});

static PHONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").ok());

static USER_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:user|id|account)[-_]?\d+\b").ok());

/// Category of personal data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiRule {
    Emails,
    Phones,
    UserIds,
}

impl PiiRule {
    /// Every rule, in masking order
    pub const ALL: [Self; 3] = [Self::Emails, Self::Phones, Self::UserIds];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emails => "emails",
            Self::Phones => "phones",
            Self::UserIds => "user_ids",
        }
    }

    /// Replacement text for a match
    #[must_use]
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Emails => "[EMAIL_MASKED]",
            Self::Phones => "[PHONE_MASKED]",
            Self::UserIds => "[USER_ID_MASKED]",
        }
    }

    fn pattern(self) -> Option<&'static Regex> {
        match self {
            Self::Emails => EMAIL.as_ref(),
            Self::Phones => PHONE.as_ref(),
            Self::UserIds => USER_ID.as_ref(),
        }
    }
}

impl fmt::Display for PiiRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PiiRule {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emails" | "email" => Ok(Self::Emails),
            "phones" | "phone" => Ok(Self::Phones),
            "user_ids" | "user_id" | "userids" => Ok(Self::UserIds),
            other => Err(HealError::invalid_input(format!("unknown PII rule: {other}"))),
        }
    }
}

/// Replace personal data with placeholders. An empty rule list applies every
/// rule.
#[must_use]
pub fn mask_pii(html: &str, rules: &[PiiRule]) -> String {
    let rules: &[PiiRule] = if rules.is_empty() { &PiiRule::ALL } else { rules };
    let mut masked = html.to_string();
    for rule in PiiRule::ALL.into_iter().filter(|r| rules.contains(r)) {
        if let Some(pattern) = rule.pattern() {
            masked = pattern.replace_all(&masked, rule.placeholder()).into_owned();
        }
    }
    masked
}

/// Rules with at least one match in `html`
#[must_use]
pub fn detect_pii(html: &str) -> Vec<PiiRule> {
    PiiRule::ALL
        .into_iter()
        .filter(|rule| rule.pattern().is_some_and(|p| p.is_match(html)))
        .collect()
}

/// Whether the page shows an e-mail address or a phone number
#[must_use]
pub fn contains_contact_pii(html: &str) -> bool {
    detect_pii(html)
        .iter()
        .any(|r| matches!(r, PiiRule::Emails | PiiRule::Phones))
}
