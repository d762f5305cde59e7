//! Harness configuration: timeouts, pacing, artifact location and credentials.

use crate::result::{KensaError, KensaResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default artifact directory
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// Default poll interval for screen probes
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Bounded waits used across the flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Element actions
    pub action: Duration,
    /// Navigation
    pub navigation: Duration,
    /// Expected screen after a click
    pub screen: Duration,
    /// Slow screens (card image, detail blocks, paid screens)
    pub slow_screen: Duration,
    /// Lead modal appearance
    pub lead_modal: Duration,
    /// Return from LINE login to the content
    pub post_login: Duration,
    /// SNS check convergence
    pub sns_converge: Duration,
    /// CAPTCHA watch after embedded form submit
    pub captcha_watch: Duration,
    /// Inline required errors in the embedded form
    pub inline_errors: Duration,
    /// Popup or new tab after a link click
    pub popup: Duration,
    /// Used notice after a replay attempt
    pub toast: Duration,
    /// Proceed screens after a replay attempt
    pub proceed: Duration,
    /// Card image source change after advancing
    pub reveal: Duration,
    /// Paid screen readiness after the lead
    pub paid_ready: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            action: Duration::from_secs(30),
            navigation: Duration::from_secs(45),
            screen: Duration::from_secs(20),
            slow_screen: Duration::from_secs(45),
            lead_modal: Duration::from_secs(25),
            post_login: Duration::from_secs(90),
            sns_converge: Duration::from_secs(25),
            captcha_watch: Duration::from_secs(25),
            inline_errors: Duration::from_secs(6),
            popup: Duration::from_secs(15),
            toast: Duration::from_secs(4),
            proceed: Duration::from_secs(15),
            reveal: Duration::from_secs(20),
            paid_ready: Duration::from_secs(35),
        }
    }
}

impl Timeouts {
    /// Set the action timeout
    #[must_use]
    pub const fn with_action(mut self, timeout: Duration) -> Self {
        self.action = timeout;
        self
    }

    /// Set the navigation timeout
    #[must_use]
    pub const fn with_navigation(mut self, timeout: Duration) -> Self {
        self.navigation = timeout;
        self
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Login identity for an external service
#[derive(Clone, PartialEq, Eq)]
pub struct LoginPair {
    /// Account id or email
    pub email: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for LoginPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginPair")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl LoginPair {
    /// Create a login pair
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    fn from_env(email_var: &str, password_var: &str) -> Option<Self> {
        let email = std::env::var(email_var).ok().filter(|v| !v.is_empty())?;
        let password = std::env::var(password_var).ok().filter(|v| !v.is_empty())?;
        Some(Self::new(email, password))
    }
}

/// Secrets needed by some flows; absence only matters when a flow needs them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// LINE test account (`LINE_TEST_EMAIL` / `LINE_TEST_PASSWORD`)
    pub line: Option<LoginPair>,
    /// Paid-content member account (`MEMBER_EMAIL` / `MEMBER_PASSWORD`)
    pub member: Option<LoginPair>,
}

impl Credentials {
    /// Read credentials from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            line: LoginPair::from_env("LINE_TEST_EMAIL", "LINE_TEST_PASSWORD"),
            member: LoginPair::from_env("MEMBER_EMAIL", "MEMBER_PASSWORD"),
        }
    }

    /// LINE account or a configuration error
    pub fn require_line(&self) -> KensaResult<&LoginPair> {
        self.line.as_ref().ok_or_else(|| {
            KensaError::config("LINE login form shown but LINE_TEST_EMAIL/LINE_TEST_PASSWORD are not set")
        })
    }

    /// Member account or a configuration error
    pub fn require_member(&self) -> KensaResult<&LoginPair> {
        self.member.as_ref().ok_or_else(|| {
            KensaError::config("member login shown but MEMBER_EMAIL/MEMBER_PASSWORD are not set")
        })
    }
}

/// Values typed into lead forms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData {
    /// Email address (`FORM_TEST_EMAIL`)
    pub email: String,
    /// Free text (`FORM_TEST_TEXT`)
    pub text: String,
    /// Three-part phone number
    pub phone: [String; 3],
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            email: "test@example.com".to_string(),
            text: "E2Eテスト".to_string(),
            phone: ["080".to_string(), "1234".to_string(), "5678".to_string()],
        }
    }
}

impl FormData {
    /// Defaults overridden by `FORM_TEST_EMAIL` / `FORM_TEST_TEXT`
    #[must_use]
    pub fn from_env() -> Self {
        let mut data = Self::default();
        if let Ok(email) = std::env::var("FORM_TEST_EMAIL") {
            if !email.is_empty() {
                data.email = email;
            }
        }
        if let Ok(text) = std::env::var("FORM_TEST_TEXT") {
            if !text.is_empty() {
                data.text = text;
            }
        }
        data
    }
}

// =============================================================================
// HARNESS CONFIG
// =============================================================================

/// Configuration shared by every scenario of a run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Artifact root
    pub artifact_dir: PathBuf,
    /// Bounded waits
    pub timeouts: Timeouts,
    /// Interval between screen probes
    pub poll_interval: Duration,
    /// Pause between visual steps for local watching
    pub demo_pause: Duration,
    /// Login secrets
    pub credentials: Credentials,
    /// Lead form input values
    pub form_data: FormData,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            timeouts: Timeouts::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            demo_pause: Duration::ZERO,
            credentials: Credentials::default(),
            form_data: FormData::default(),
        }
    }
}

impl HarnessConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the artifact root
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Set the timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the demo pause (use zero under CI)
    #[must_use]
    pub const fn with_demo_pause(mut self, pause: Duration) -> Self {
        self.demo_pause = pause;
        self
    }

    /// Set the credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the form values
    #[must_use]
    pub fn with_form_data(mut self, form_data: FormData) -> Self {
        self.form_data = form_data;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.action, Duration::from_secs(30));
        assert_eq!(t.navigation, Duration::from_secs(45));
        assert_eq!(t.post_login, Duration::from_secs(90));
    }

    #[test]
    fn test_builder_chain() {
        let config = HarnessConfig::new()
            .with_artifact_dir("/tmp/a")
            .with_poll_interval(Duration::from_millis(300))
            .with_demo_pause(Duration::from_millis(800))
            .with_timeouts(Timeouts::default().with_action(Duration::from_secs(5)));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/a"));
        assert_eq!(config.poll_interval, Duration::from_millis(300));
        assert_eq!(config.demo_pause, Duration::from_millis(800));
        assert_eq!(config.timeouts.action, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let creds = Credentials::default();
        assert!(creds.require_line().unwrap_err().is_configuration());
        assert!(creds.require_member().unwrap_err().is_configuration());
    }

    #[test]
    fn test_present_credentials() {
        let creds = Credentials {
            line: Some(LoginPair::new("a@example.com", "pw")),
            member: None,
        };
        assert_eq!(creds.require_line().unwrap().email, "a@example.com");
    }

    #[test]
    fn test_password_not_in_debug() {
        let pair = LoginPair::new("a@example.com", "hunter2");
        let debug = format!("{pair:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_form_data_defaults() {
        let data = FormData::default();
        assert_eq!(data.email, "test@example.com");
        assert_eq!(data.phone[0], "080");
    }
}
