//! Result and error types for Kensa.

use thiserror::Error;

/// Result type for Kensa operations
pub type KensaResult<T> = Result<T, KensaError>;

/// Errors that can occur while loading or verifying a scenario
#[derive(Debug, Error)]
pub enum KensaError {
    /// A structural check on the page did not hold
    #[error("Verification failed: {condition}")]
    Mismatch {
        /// Named sub-condition that failed (also the artifact name)
        condition: String,
    },

    /// Result detail or link extraction could not complete
    #[error("Extraction failed at {condition}: {message}")]
    Extraction {
        /// Named sub-condition that failed
        condition: String,
        /// Error message
        message: String,
    },

    /// An external gate condition stopped the run; neither pass nor fail
    #[error("Skipped: {reason}")]
    Skipped {
        /// Why the run was skipped
        reason: String,
    },

    /// Operation timed out
    #[error("Timed out after {ms}ms waiting for {what}")]
    Timeout {
        /// What was awaited
        what: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Scenario file is malformed
    #[error("Invalid scenario: {message}")]
    InvalidScenario {
        /// Error message
        message: String,
    },

    /// Harness configuration is missing or unsupported
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Browser session failed (launch, navigation, element action)
    #[error("Session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// Selector matched no element for an action
    #[error("No element matches {selector}")]
    ElementNotFound {
        /// Selector description
        selector: String,
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

impl KensaError {
    /// Create a mismatch error for a named condition
    #[must_use]
    pub fn mismatch(condition: impl Into<String>) -> Self {
        Self::Mismatch {
            condition: condition.into(),
        }
    }

    /// Create an extraction error
    #[must_use]
    pub fn extraction(condition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            condition: condition.into(),
            message: message.into(),
        }
    }

    /// Create a skip signal
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether the run should end as skipped
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid scenario error
    #[must_use]
    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }

    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Whether this error stems from configuration rather than page state
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::InvalidScenario { .. })
    }

    /// The named condition carried by verification failures
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        match self {
            Self::Mismatch { condition } | Self::Extraction { condition, .. } => Some(condition),
            _ => None,
        }
    }
}
