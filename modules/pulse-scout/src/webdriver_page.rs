use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use pulse_common::config::BrowserConfig;
use pulse_common::PulseError;
use webdriver_client::{Browser, Capabilities, Cookie, WebDriverClient, WebDriverSession};

use crate::traits::BrowserPage;

/// Collects the visible text of every match in one round trip instead of one
/// request per element.
const QUERY_TEXTS_SCRIPT: &str = "return Array.from(document.querySelectorAll(arguments[0]), \
     el => (el.innerText || el.textContent || ''));";

/// A live browser window driven over the WebDriver protocol.
pub struct WebDriverPage {
    session: WebDriverSession,
}

impl WebDriverPage {
    /// Open a new browser window through the configured WebDriver server.
    pub async fn open(config: &BrowserConfig) -> Result<Self, PulseError> {
        let browser = browser_kind(&config.name)?;
        let capabilities = config
            .args
            .iter()
            .fold(Capabilities::new(browser), |caps, arg| caps.arg(arg.as_str()));

        let client = WebDriverClient::new(&config.webdriver_url, config.command_timeout())
            .map_err(|e| PulseError::Browser(e.to_string()))?;
        let session = client.new_session(&capabilities).await.map_err(|e| {
            PulseError::Browser(format!(
                "Could not start {} via {}: {e}",
                config.name, config.webdriver_url
            ))
        })?;
        info!(browser = %config.name, session_id = session.id(), "Browser opened");

        Ok(Self { session })
    }
}

pub fn browser_kind(name: &str) -> Result<Browser, PulseError> {
    match name.to_ascii_lowercase().as_str() {
        "edge" | "msedge" | "microsoftedge" => Ok(Browser::Edge),
        "chrome" | "chromium" => Ok(Browser::Chrome),
        "firefox" => Ok(Browser::Firefox),
        other => Err(PulseError::Config(format!(
            "Unsupported browser {other:?}, expected edge, chrome or firefox"
        ))),
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.session
            .navigate(url)
            .await
            .with_context(|| format!("Failed to open {url}"))
    }

    async fn query_texts(&self, selector: &str) -> Result<Vec<String>> {
        let value = self
            .session
            .execute(QUERY_TEXTS_SCRIPT, vec![json!(selector)])
            .await?;
        texts_from_value(value)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        Ok(self.session.execute(script, Vec::new()).await?)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.session.current_url().await?)
    }

    async fn export_session(&self) -> Result<Value> {
        let cookies = self.session.cookies().await?;
        Ok(serde_json::to_value(cookies)?)
    }

    async fn import_session(&self, state: &Value) -> Result<()> {
        let cookies: Vec<Cookie> =
            serde_json::from_value(state.clone()).context("Saved session is not a cookie list")?;

        self.session.delete_all_cookies().await?;
        let mut added = 0;
        for cookie in &cookies {
            match self.session.add_cookie(cookie).await {
                Ok(()) => added += 1,
                // Cookies for other domains are refused; the rest still apply.
                Err(e) => warn!(cookie = %cookie.name, error = %e, "Cookie rejected"),
            }
        }
        if added == 0 && !cookies.is_empty() {
            bail!("Browser rejected all {} saved cookies", cookies.len());
        }
        info!(added, total = cookies.len(), "Session cookies imported");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(self.session.quit().await?)
    }
}

fn texts_from_value(value: Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect()),
        other => bail!("Unexpected query result: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_names_map_case_insensitively() {
        assert_eq!(browser_kind("Edge").unwrap(), Browser::Edge);
        assert_eq!(browser_kind("chrome").unwrap(), Browser::Chrome);
        assert_eq!(browser_kind("FIREFOX").unwrap(), Browser::Firefox);
        assert!(matches!(browser_kind("safari"), Err(PulseError::Config(_))));
    }

    #[test]
    fn query_result_keeps_order_and_blank_entries() {
        let texts = texts_from_value(json!(["first", null, "", "third"])).unwrap();
        assert_eq!(texts, vec!["first", "", "", "third"]);
        assert!(texts_from_value(Value::Null).unwrap().is_empty());
        assert!(texts_from_value(json!({"x": 1})).is_err());
    }
}
