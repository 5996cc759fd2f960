pub mod error;
pub mod types;

pub use error::{Result, WebDriverError};
pub use types::{Browser, Capabilities, Cookie};

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use types::{Envelope, ErrorValue, NewSessionValue};

/// Entry point to a running WebDriver server (msedgedriver, chromedriver, geckodriver).
pub struct WebDriverClient {
    client: reqwest::Client,
    base_url: String,
}

impl WebDriverClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Open a new browser window. The returned session owns that window until `quit`.
    pub async fn new_session(&self, capabilities: &Capabilities) -> Result<WebDriverSession> {
        let endpoint = format!("{}/session", self.base_url);
        let body = capabilities.to_request();

        let value: NewSessionValue =
            send(&self.client, Method::POST, &endpoint, Some(&body)).await?;
        info!(session_id = %value.session_id, "WebDriver session started");

        Ok(WebDriverSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id: value.session_id,
        })
    }
}

/// A live browser session. Every method maps to one WebDriver command.
pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let _: Value = self
            .command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        self.command(Method::GET, "url", None).await
    }

    /// Run a synchronous script; `arguments[i]` in the script maps to `args[i]`.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        self.command(Method::GET, "cookie", None).await
    }

    pub async fn add_cookie(&self, cookie: &Cookie) -> Result<()> {
        let _: Value = self
            .command(Method::POST, "cookie", Some(json!({ "cookie": cookie })))
            .await?;
        Ok(())
    }

    pub async fn delete_all_cookies(&self) -> Result<()> {
        let _: Value = self.command(Method::DELETE, "cookie", None).await?;
        Ok(())
    }

    /// Close the window and end the session.
    pub async fn quit(&self) -> Result<()> {
        let endpoint = format!("{}/session/{}", self.base_url, self.session_id);
        let _: Value = send(&self.client, Method::DELETE, &endpoint, None).await?;
        info!(session_id = %self.session_id, "WebDriver session closed");
        Ok(())
    }

    async fn command<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let endpoint = format!("{}/session/{}/{}", self.base_url, self.session_id, path);
        send(&self.client, method, &endpoint, body.as_ref()).await
    }
}

async fn send<T: DeserializeOwned>(
    client: &reqwest::Client,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
) -> Result<T> {
    debug!(%method, endpoint, "WebDriver command");

    let mut request = client.request(method, endpoint);
    if let Some(body) = body {
        request = request.json(body);
    }
    let resp = request.send().await?;

    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(command_error(status.as_u16(), &text));
    }

    let envelope: Envelope<T> = serde_json::from_str(&text)?;
    Ok(envelope.value)
}

fn command_error(status: u16, body: &str) -> WebDriverError {
    match serde_json::from_str::<Envelope<ErrorValue>>(body) {
        Ok(envelope) => WebDriverError::Command {
            status,
            error: envelope.value.error,
            message: envelope.value.message,
        },
        Err(_) => WebDriverError::Command {
            status,
            error: "unknown error".to_string(),
            message: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_reads_w3c_error_body() {
        let body = r#"{"value":{"error":"no such element","message":"Unable to locate","stacktrace":""}}"#;
        let err = command_error(404, body);
        assert!(matches!(err, WebDriverError::Command { status: 404, ref error, .. } if error == "no such element"));
        assert!(err.to_string().contains("Unable to locate"));
    }

    #[test]
    fn command_error_keeps_unparseable_body() {
        let err = command_error(502, "Bad Gateway");
        match err {
            WebDriverError::Command { status, error, message } => {
                assert_eq!(status, 502);
                assert_eq!(error, "unknown error");
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
