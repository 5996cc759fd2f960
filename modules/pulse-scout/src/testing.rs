// Test mocks for the harvesting pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockPage (BrowserPage): scripted scroll rounds and URL sequence
// - MockModel (SentimentModel): HashMap-based text→prediction
// - RecordingSink (ReportSink): keeps written rows in memory
//
// Plus `test_config()` with every delay zeroed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use pulse_common::{ClassifiedRecord, Config};

use crate::traits::{BrowserPage, Prediction, ReportSink, SentimentModel};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Match the default site config.
pub const TEST_HOME_URL: &str = "https://weibo.com/";
pub const TEST_LOGIN_URL: &str = "https://weibo.com/login.php";
pub const TEST_POST_URL: &str = "https://weibo.com/1234567890/PqRsTuVwX";

/// Default config with all waits at zero and a short stall guard.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.login.initial_delay_secs = 0;
    config.login.poll_interval_secs = 0;
    config.login.timeout_secs = 0;
    config.login.restore_delay_secs = 0;
    config.harvest.initial_delay_secs = 0;
    config.harvest.round_delay_secs = 0;
    config.harvest.scroll_delay_secs = 0;
    config.harvest.idle_rounds = 2;
    config
}

/// `n` distinct (author, text) pairs starting at index `start`.
pub fn comment_batch(start: usize, n: usize) -> Vec<(String, String)> {
    (start..start + n)
        .map(|i| (format!("user{i}"), format!("comment number {i}")))
        .collect()
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PageState {
    rounds: Vec<(Vec<String>, Vec<String>)>,
    round: usize,
    repeat_last: bool,

    urls: VecDeque<String>,
    url_polls: usize,
    authenticated_after: Option<usize>,
    accepts_sessions: bool,
    authenticated: bool,

    session_state: Value,
    imported: Option<Value>,

    failing_navigations: HashSet<String>,
    navigations: Vec<String>,
    scripts: Vec<String>,
    closed: bool,
}

impl PageState {
    fn current_round(&self) -> Option<&(Vec<String>, Vec<String>)> {
        match self.rounds.get(self.round) {
            Some(round) => Some(round),
            None if self.repeat_last => self.rounds.last(),
            None => None,
        }
    }
}

/// Scripted browser page.
///
/// Each scroll (`evaluate`) advances to the next comment round; past the last
/// round the page is empty unless `.repeat_last_round()` is set. The page
/// counts as logged in once an imported session is accepted or `current_url`
/// has been polled `authenticated_after_polls` times.
pub struct MockPage {
    state: Mutex<PageState>,
    author_selector: String,
    text_selector: String,
    marker_selector: String,
}

impl MockPage {
    pub fn new() -> Self {
        let config = test_config();
        Self {
            state: Mutex::new(PageState {
                session_state: Value::Array(Vec::new()),
                ..PageState::default()
            }),
            author_selector: config.harvest.author_selector,
            text_selector: config.harvest.text_selector,
            marker_selector: config.site.authenticated_selector,
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    pub fn with_round(mut self, batch: Vec<(String, String)>) -> Self {
        let (authors, texts): (Vec<String>, Vec<String>) = batch.into_iter().unzip();
        self.state.get_mut().unwrap().rounds.push((authors, texts));
        self
    }

    /// A round whose author and text lists may differ in length.
    pub fn with_raw_round(mut self, authors: &[&str], texts: &[&str]) -> Self {
        let authors = authors.iter().map(|s| s.to_string()).collect();
        let texts = texts.iter().map(|s| s.to_string()).collect();
        self.state.get_mut().unwrap().rounds.push((authors, texts));
        self
    }

    pub fn repeat_last_round(mut self) -> Self {
        self.state.get_mut().unwrap().repeat_last = true;
        self
    }

    /// URLs returned by successive `current_url` polls; the last one sticks.
    pub fn with_urls(mut self, urls: &[&str]) -> Self {
        self.state.get_mut().unwrap().urls = urls.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn authenticated_after_polls(mut self, polls: usize) -> Self {
        self.state.get_mut().unwrap().authenticated_after = Some(polls);
        self
    }

    pub fn accepts_sessions(mut self, accepts: bool) -> Self {
        self.state.get_mut().unwrap().accepts_sessions = accepts;
        self
    }

    pub fn with_session_state(mut self, state: Value) -> Self {
        self.state.get_mut().unwrap().session_state = state;
        self
    }

    pub fn fail_navigation_to(mut self, url: &str) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .failing_navigations
            .insert(url.to_string());
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state().scripts.clone()
    }

    pub fn url_polls(&self) -> usize {
        self.state().url_polls
    }

    pub fn imported_state(&self) -> Option<Value> {
        self.state().imported.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        state.navigations.push(url.to_string());
        if state.failing_navigations.contains(url) {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        }
        Ok(())
    }

    async fn query_texts(&self, selector: &str) -> Result<Vec<String>> {
        let state = self.state();
        if selector == self.marker_selector {
            return Ok(if state.authenticated {
                vec![String::new()]
            } else {
                Vec::new()
            });
        }
        let round = state.current_round();
        if selector == self.author_selector {
            Ok(round.map(|(authors, _)| authors.clone()).unwrap_or_default())
        } else if selector == self.text_selector {
            Ok(round.map(|(_, texts)| texts.clone()).unwrap_or_default())
        } else {
            Ok(Vec::new())
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let mut state = self.state();
        state.scripts.push(script.to_string());
        state.round += 1;
        Ok(Value::Null)
    }

    async fn current_url(&self) -> Result<String> {
        let mut state = self.state();
        state.url_polls += 1;
        if matches!(state.authenticated_after, Some(n) if state.url_polls >= n) {
            state.authenticated = true;
        }
        let url = if state.urls.len() > 1 {
            state.urls.pop_front()
        } else {
            state.urls.front().cloned()
        };
        Ok(url
            .or_else(|| state.navigations.last().cloned())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn export_session(&self) -> Result<Value> {
        Ok(self.state().session_state.clone())
    }

    async fn import_session(&self, state: &Value) -> Result<()> {
        let mut page = self.state();
        page.imported = Some(state.clone());
        if page.accepts_sessions {
            page.authenticated = true;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockModel
// ---------------------------------------------------------------------------

/// Returns `Err` for unregistered texts unless a default prediction is set.
/// Builder pattern: `.on_text()`, `.fail_on()`, `.default_prediction()`.
pub struct MockModel {
    responses: HashMap<String, Option<Prediction>>,
    default: Option<Prediction>,
    inputs: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn on_text(mut self, text: &str, label: &str, score: f64) -> Self {
        self.responses
            .insert(text.to_string(), Some(Prediction::new(label, score)));
        self
    }

    pub fn fail_on(mut self, text: &str) -> Self {
        self.responses.insert(text.to_string(), None);
        self
    }

    pub fn default_prediction(mut self, label: &str, score: f64) -> Self {
        self.default = Some(Prediction::new(label, score));
        self
    }

    /// Every text the model was asked about, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentModel for MockModel {
    async fn predict(&self, text: &str) -> Result<Prediction> {
        self.inputs.lock().unwrap().push(text.to_string());
        match self.responses.get(text) {
            Some(Some(prediction)) => Ok(prediction.clone()),
            Some(None) => Err(anyhow!("inference server returned 500 for {text:?}")),
            None => self
                .default
                .clone()
                .ok_or_else(|| anyhow!("MockModel: no prediction registered for {text:?}")),
        }
    }

    fn name(&self) -> &str {
        "mock-model"
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Keeps the last written report in memory.
pub struct RecordingSink {
    rows: Mutex<Option<Vec<ClassifiedRecord>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(None),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: Mutex::new(None),
            fail: true,
        }
    }

    /// `None` until a report has been written.
    pub fn rows(&self) -> Option<Vec<ClassifiedRecord>> {
        self.rows.lock().unwrap().clone()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for RecordingSink {
    fn write(&self, rows: &[ClassifiedRecord]) -> Result<()> {
        if self.fail {
            bail!("disk full");
        }
        *self.rows.lock().unwrap() = Some(rows.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
