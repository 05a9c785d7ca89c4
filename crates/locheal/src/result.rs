//! Result and error types for Locheal.

use thiserror::Error;

/// Result type for Locheal operations
pub type HealResult<T> = Result<T, HealError>;

/// Errors that can occur while healing a locator
#[derive(Debug, Error)]
pub enum HealError {
    /// Caller supplied unusable input (blank HTML, blank locator)
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message
        message: String,
    },

    /// HTML could not be parsed
    #[error("HTML parse failed: {message}")]
    HtmlParse {
        /// Error message
        message: String,
    },

    /// Selector could not be parsed
    #[error("Unsupported selector `{selector}`: {message}")]
    Selector {
        /// Offending selector
        selector: String,
        /// Error message
        message: String,
    },

    /// Rescorer failed to produce a score
    #[error("Rescorer failed: {message}")]
    Rescorer {
        /// Error message
        message: String,
    },

    /// External candidate provider failed
    #[error("Candidate provider failed: {message}")]
    Provider {
        /// Error message
        message: String,
    },

    /// Configuration is out of range or malformed
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HealError {
    /// Create an invalid input error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an HTML parse error
    #[must_use]
    pub fn html_parse(message: impl Into<String>) -> Self {
        Self::HtmlParse {
            message: message.into(),
        }
    }

    /// Create a selector error
    #[must_use]
    pub fn selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create a rescorer error
    #[must_use]
    pub fn rescorer(message: impl Into<String>) -> Self {
        Self::Rescorer {
            message: message.into(),
        }
    }

    /// Create a provider error
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error is fatal for a healing request
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::Config { .. })
    }
}
