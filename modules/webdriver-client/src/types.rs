use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope every WebDriver response is wrapped in.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub value: T,
}

/// Error payload carried in `value` for non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorValue {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewSessionValue {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// A browser cookie as exchanged over `/cookie`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(rename = "httpOnly", skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Edge,
    Chrome,
    Firefox,
}

impl Browser {
    fn browser_name(self) -> &'static str {
        match self {
            Browser::Edge => "MicrosoftEdge",
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }

    fn options_key(self) -> &'static str {
        match self {
            Browser::Edge => "ms:edgeOptions",
            Browser::Chrome => "goog:chromeOptions",
            Browser::Firefox => "moz:firefoxOptions",
        }
    }
}

/// Capabilities sent with `POST /session`.
#[derive(Debug, Clone)]
pub struct Capabilities {
    browser: Browser,
    args: Vec<String>,
}

impl Capabilities {
    pub fn new(browser: Browser) -> Self {
        Self {
            browser,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn to_request(&self) -> Value {
        let mut always_match = serde_json::Map::new();
        always_match.insert(
            "browserName".to_string(),
            Value::String(self.browser.browser_name().to_string()),
        );
        if !self.args.is_empty() {
            always_match.insert(
                self.browser.options_key().to_string(),
                json!({ "args": self.args }),
            );
        }
        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_capabilities_carry_args_under_vendor_key() {
        let caps = Capabilities::new(Browser::Edge).arg("--start-maximized");
        let body = caps.to_request();
        let always = &body["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "MicrosoftEdge");
        assert_eq!(always["ms:edgeOptions"]["args"][0], "--start-maximized");
    }

    #[test]
    fn capabilities_without_args_omit_options() {
        let body = Capabilities::new(Browser::Firefox).to_request();
        let always = &body["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "firefox");
        assert!(always.get("moz:firefoxOptions").is_none());
    }

    #[test]
    fn cookie_omits_absent_fields() {
        let cookie = Cookie {
            name: "SUB".to_string(),
            value: "token".to_string(),
            path: Some("/".to_string()),
            domain: None,
            secure: None,
            http_only: Some(true),
            expiry: None,
            same_site: None,
        };
        let value = serde_json::to_value(&cookie).unwrap();
        assert_eq!(value["httpOnly"], true);
        assert!(value.get("domain").is_none());
        assert!(value.get("expiry").is_none());
    }
}
