//! CLI configuration

use kensa::{Credentials, FormData, HarnessConfig, Timeouts};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// From the `-q` flag and the `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Default log filter when `RUST_LOG` is unset
    #[must_use]
    pub const fn log_level(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "kensa=info,warn",
            Self::Debug => "kensa=debug,info",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// Whether a `CI` value means "running under CI"
#[must_use]
pub fn is_ci_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
    })
}

/// Whether the process runs under CI
#[must_use]
pub fn is_ci() -> bool {
    is_ci_value(std::env::var("CI").ok().as_deref())
}

/// Settings of one `kensa run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Artifact and trace root
    pub artifact_dir: PathBuf,
    /// Run Chromium without a window
    pub headless: bool,
    /// Chromium binary
    pub chrome_path: Option<PathBuf>,
    /// Parent directory for per-scenario profiles
    pub profile_dir: Option<PathBuf>,
    /// Per-action budget in milliseconds
    pub timeout_ms: u64,
    /// Navigation budget in milliseconds
    pub nav_timeout_ms: u64,
    /// Delay before each browser action in milliseconds
    pub slowmo_ms: u64,
    /// Pause between visual steps in milliseconds
    pub demo_wait_ms: u64,
    /// Running under CI
    pub ci: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from(kensa::DEFAULT_ARTIFACT_DIR),
            headless: true,
            chrome_path: None,
            profile_dir: None,
            timeout_ms: 30_000,
            nav_timeout_ms: 45_000,
            slowmo_ms: 0,
            demo_wait_ms: 0,
            ci: false,
        }
    }
}

impl RunSettings {
    /// Demo pause, always zero under CI
    #[must_use]
    pub const fn demo_pause(&self) -> Duration {
        if self.ci {
            Duration::ZERO
        } else {
            Duration::from_millis(self.demo_wait_ms)
        }
    }

    /// Library configuration with credentials and form data from the environment
    #[must_use]
    pub fn harness_config(&self) -> HarnessConfig {
        let timeouts = Timeouts::default()
            .with_action(Duration::from_millis(self.timeout_ms))
            .with_navigation(Duration::from_millis(self.nav_timeout_ms));
        HarnessConfig::new()
            .with_artifact_dir(&self.artifact_dir)
            .with_timeouts(timeouts)
            .with_demo_pause(self.demo_pause())
            .with_credentials(Credentials::from_env())
            .with_form_data(FormData::from_env())
    }

    /// Chromium launch options
    #[cfg(feature = "browser")]
    #[must_use]
    pub fn cdp_options(&self) -> kensa::CdpOptions {
        let mut options = kensa::CdpOptions::default()
            .with_headless(self.headless)
            .with_navigation_timeout(Duration::from_millis(self.nav_timeout_ms))
            .with_slow_mo(Duration::from_millis(self.slowmo_ms));
        if let Some(ref path) = self.chrome_path {
            options = options.with_chrome_path(path);
        }
        if let Some(ref dir) = self.profile_dir {
            options = options.with_profile_dir(dir);
        }
        if self.ci {
            options = options.with_no_sandbox();
        }
        options
    }

    /// Report path inside the artifact directory
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.artifact_dir.join("report.json")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_from_flags() {
            assert_eq!(Verbosity::from_flags(true, 3), Verbosity::Quiet);
            assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
            assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
            assert_eq!(Verbosity::from_flags(false, 5), Verbosity::Debug);
        }

        #[test]
        fn test_is_verbose() {
            assert!(!Verbosity::Quiet.is_verbose());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Verbose.is_verbose());
            assert!(Verbosity::Debug.is_verbose());
        }

        #[test]
        fn test_log_levels_widen() {
            assert_eq!(Verbosity::Quiet.log_level(), "error");
            assert!(Verbosity::Debug.log_level().contains("debug"));
        }
    }

    mod color_tests {
        use super::*;

        #[test]
        fn test_explicit_choices() {
            assert!(ColorChoice::Always.should_color());
            assert!(!ColorChoice::Never.should_color());
        }
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_ci_values() {
            assert!(is_ci_value(Some("true")));
            assert!(is_ci_value(Some("1")));
            assert!(!is_ci_value(Some("false")));
            assert!(!is_ci_value(Some("0")));
            assert!(!is_ci_value(Some("")));
            assert!(!is_ci_value(None));
        }

        #[test]
        fn test_demo_pause_zero_under_ci() {
            let settings = RunSettings {
                demo_wait_ms: 800,
                ..RunSettings::default()
            };
            assert_eq!(settings.demo_pause(), Duration::from_millis(800));
            let ci = RunSettings { ci: true, ..settings };
            assert_eq!(ci.demo_pause(), Duration::ZERO);
        }

        #[test]
        fn test_harness_config_timeouts() {
            let settings = RunSettings {
                artifact_dir: PathBuf::from("out"),
                timeout_ms: 1_000,
                nav_timeout_ms: 2_000,
                ..RunSettings::default()
            };
            let config = settings.harness_config();
            assert_eq!(config.artifact_dir, PathBuf::from("out"));
            assert_eq!(config.timeouts.action, Duration::from_millis(1_000));
            assert_eq!(config.timeouts.navigation, Duration::from_millis(2_000));
            assert_eq!(settings.report_path(), PathBuf::from("out/report.json"));
        }
    }
}
