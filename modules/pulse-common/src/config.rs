use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::PulseError;

/// Application configuration.
///
/// Tunables live in a TOML file; every section is optional and falls back to
/// the defaults below. Secrets (inference token) and deployment-specific
/// endpoints come from environment variables and override the file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub login: LoginConfig,
    pub harvest: HarvestConfig,
    pub classifier: ClassifierConfig,
    pub report: ReportConfig,
    pub progress: ProgressConfig,

    #[serde(skip)]
    pub inference_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SiteConfig {
    pub home_url: String,
    pub login_url: String,
    /// Substrings of the current URL that mean "still on the login flow".
    pub login_url_markers: Vec<String>,
    /// Element only present on authenticated pages.
    pub authenticated_selector: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            home_url: "https://weibo.com/".to_string(),
            login_url: "https://weibo.com/login.php".to_string(),
            login_url_markers: vec!["login".to_string(), "passport".to_string()],
            authenticated_selector: "input[placeholder='搜索微博']".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    /// `edge`, `chrome` or `firefox`.
    pub name: String,
    pub args: Vec<String>,
    pub command_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            name: "edge".to_string(),
            args: vec!["--start-maximized".to_string()],
            command_timeout_secs: 60,
        }
    }
}

impl BrowserConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub path: PathBuf,
    /// Sessions older than this are ignored. 0 = never stale.
    pub max_age_hours: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("session.json"),
            max_age_hours: 24 * 7,
        }
    }
}

impl SessionConfig {
    /// `None` when saved sessions never expire, or when the hour count does not
    /// fit a `chrono::Duration` (rejected by `Config::validate`).
    pub fn max_age(&self) -> Option<chrono::Duration> {
        if self.max_age_hours == 0 {
            return None;
        }
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoginConfig {
    pub initial_delay_secs: u64,
    pub poll_interval_secs: u64,
    /// Upper bound on the manual login wait. 0 = wait until cancelled.
    pub timeout_secs: u64,
    /// Settle delay used while restoring a saved session.
    pub restore_delay_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            poll_interval_secs: 3,
            timeout_secs: 600,
            restore_delay_secs: 2,
        }
    }
}

impl LoginConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_secs(self.restore_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HarvestConfig {
    pub target_count: usize,
    pub initial_delay_secs: u64,
    pub round_delay_secs: u64,
    pub scroll_delay_secs: u64,
    /// Hard cap on scroll rounds. 0 = until target or exhaustion.
    pub max_rounds: usize,
    /// Consecutive rounds without a new record before giving up.
    pub idle_rounds: usize,
    pub author_selector: String,
    pub text_selector: String,
    /// Regex for collapsed-thread placeholders such as "共 5 条回复".
    pub placeholder_pattern: String,
    pub scroll_script: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target_count: 200,
            initial_delay_secs: 5,
            round_delay_secs: 3,
            scroll_delay_secs: 4,
            max_rounds: 0,
            idle_rounds: 3,
            author_selector: "div.con1.woo-box-item-flex a".to_string(),
            text_selector: "div.text > span".to_string(),
            placeholder_pattern: "^共.*条回复".to_string(),
            scroll_script: "window.scrollTo(0, document.body.scrollHeight);".to_string(),
        }
    }
}

impl HarvestConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn round_delay(&self) -> Duration {
        Duration::from_secs(self.round_delay_secs)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_secs(self.scroll_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    pub threshold: f64,
    /// Inputs are cut to this many characters before inference.
    pub max_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co".to_string(),
            model: "IDEA-CCNL/Erlangshen-Roberta-110M-Sentiment".to_string(),
            threshold: 0.6,
            max_chars: 512,
            request_timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReportConfig {
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("comments_sentiment.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProgressConfig {
    /// Bounded channel capacity between the worker and the presenter.
    pub buffer: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}

impl Config {
    /// Load the TOML file (defaults when it does not exist), apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, PulseError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                PulseError::Config(format!("Failed to read {}: {e}", path.display()))
            })?;
            Self::from_toml(&content)?
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, PulseError> {
        toml::from_str(content).map_err(|e| PulseError::Config(format!("Invalid config: {e}")))
    }

    /// Apply `PULSE_*` overrides from the given lookup (normally the process env).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("PULSE_INFERENCE_TOKEN").filter(|t| !t.is_empty()) {
            self.inference_token = Some(token);
        }
        if let Some(url) = lookup("PULSE_WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
        if let Some(url) = lookup("PULSE_INFERENCE_URL") {
            self.classifier.base_url = url;
        }
        if let Some(path) = lookup("PULSE_SESSION_PATH") {
            self.session.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        if !(0.0..=1.0).contains(&self.classifier.threshold) {
            return Err(PulseError::Config(format!(
                "classifier.threshold must be within [0, 1], got {}",
                self.classifier.threshold
            )));
        }
        if self.classifier.max_chars == 0 {
            return Err(PulseError::Config("classifier.max_chars must be > 0".into()));
        }
        if self.harvest.target_count == 0 {
            return Err(PulseError::Config("harvest.target_count must be > 0".into()));
        }
        if self.harvest.author_selector.trim().is_empty()
            || self.harvest.text_selector.trim().is_empty()
        {
            return Err(PulseError::Config("harvest selectors must not be empty".into()));
        }
        if let Err(e) = regex::Regex::new(&self.harvest.placeholder_pattern) {
            return Err(PulseError::Config(format!(
                "harvest.placeholder_pattern {:?} is not a valid regex: {e}",
                self.harvest.placeholder_pattern
            )));
        }
        if self.session.max_age_hours > 0 && self.session.max_age().is_none() {
            return Err(PulseError::Config(format!(
                "session.max_age_hours is out of range, got {}",
                self.session.max_age_hours
            )));
        }
        if self.progress.buffer == 0 {
            return Err(PulseError::Config("progress.buffer must be > 0".into()));
        }
        Ok(())
    }

    /// Log the effective configuration. The inference token is never printed.
    pub fn log_summary(&self) {
        info!(
            home_url = %self.site.home_url,
            webdriver_url = %self.browser.webdriver_url,
            browser = %self.browser.name,
            session_path = %self.session.path.display(),
            "Site and browser"
        );
        info!(
            target_count = self.harvest.target_count,
            max_rounds = self.harvest.max_rounds,
            idle_rounds = self.harvest.idle_rounds,
            author_selector = %self.harvest.author_selector,
            text_selector = %self.harvest.text_selector,
            "Harvest"
        );
        info!(
            model = %self.classifier.model,
            threshold = self.classifier.threshold,
            token_set = self.inference_token.is_some(),
            report = %self.report.path.display(),
            "Classifier and report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_site_behaviour() {
        let config = Config::default();
        assert_eq!(config.harvest.target_count, 200);
        assert!((config.classifier.threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.classifier.max_chars, 512);
        assert_eq!(config.login.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.login.timeout(), Some(Duration::from_secs(600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [harvest]
            target_count = 50
            text_selector = "div.comment"

            [login]
            timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.harvest.target_count, 50);
        assert_eq!(config.harvest.text_selector, "div.comment");
        assert_eq!(config.harvest.author_selector, "div.con1.woo-box-item-flex a");
        assert_eq!(config.login.timeout(), None);
        assert_eq!(config.login.poll_interval_secs, 3);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::from_toml("[harvest]\ntarget = 5\n").unwrap_err();
        assert!(matches!(err, PulseError::Config(_)));
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut config = Config::default();
        config.classifier.threshold = 1.5;
        assert!(matches!(config.validate(), Err(PulseError::Config(_))));
    }

    #[test]
    fn oversized_session_age_fails_validation_without_panicking() {
        let config = Config::from_toml("[session]\nmax_age_hours = 9000000000000000\n").unwrap();
        assert!(config.session.max_age().is_none());
        assert!(matches!(config.validate(), Err(PulseError::Config(_))));

        let week = Config::default();
        assert_eq!(week.session.max_age(), Some(chrono::Duration::hours(24 * 7)));
        let never = SessionConfig {
            max_age_hours: 0,
            ..SessionConfig::default()
        };
        assert!(never.max_age().is_none());
    }

    #[test]
    fn invalid_placeholder_pattern_fails_validation() {
        let config = Config::from_toml("[harvest]\nplaceholder_pattern = \"(\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PulseError::Config(ref m) if m.contains("placeholder_pattern")));
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "PULSE_INFERENCE_TOKEN" => Some("hf_secret".to_string()),
            "PULSE_SESSION_PATH" => Some("/tmp/pulse/session.json".to_string()),
            _ => None,
        });
        assert_eq!(config.inference_token.as_deref(), Some("hf_secret"));
        assert_eq!(config.session.path, PathBuf::from("/tmp/pulse/session.json"));
        assert_eq!(config.browser.webdriver_url, "http://localhost:9515");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.report.path, PathBuf::from("comments_sentiment.csv"));
    }
}
