pub mod error;
pub mod types;

pub use error::{InferenceError, Result};
pub use types::LabelScore;

use std::time::Duration;

use tracing::debug;
use types::{ClassificationInput, ClassificationOutput, InferenceOptions};

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Client for a hosted text-classification model, e.g.
/// `IDEA-CCNL/Erlangshen-Roberta-110M-Sentiment` on the Hugging Face inference API
/// or a self-hosted server exposing the same `/models/{id}` route.
pub struct SentimentClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    token: Option<String>,
}

impl SentimentClient {
    pub fn new(model: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
            token: token.map(String::from),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify one text and return the top label with its score.
    pub async fn classify(&self, text: &str) -> Result<LabelScore> {
        let endpoint = format!("{}/models/{}", self.base_url, self.model);
        let input = ClassificationInput {
            inputs: text,
            options: InferenceOptions {
                wait_for_model: true,
            },
        };

        debug!(model = %self.model, chars = text.chars().count(), "Classification request");

        let mut request = self.client.post(&endpoint).json(&input);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.text().await?;
        let output: ClassificationOutput = serde_json::from_str(&body)?;
        output.top().ok_or(InferenceError::EmptyPrediction)
    }
}
