// Trait abstractions for the pipeline's external collaborators.
//
// BrowserPage: one live, already-open browser page (WebDriver in production).
// SentimentModel: raw (label, score) inference.
// ReportSink: where finished report rows go (CSV in production).
//
// These enable deterministic testing with MockPage, MockModel and
// RecordingSink: no browser, no model server, no filesystem.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use pulse_common::ClassifiedRecord;

// ---------------------------------------------------------------------------
// BrowserPage
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Text of every element currently matching `selector`, in document order.
    /// An empty vec means nothing matched.
    async fn query_texts(&self, selector: &str) -> Result<Vec<String>>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn current_url(&self) -> Result<String>;

    /// Snapshot the authentication state in the driver's native format.
    async fn export_session(&self) -> Result<serde_json::Value>;

    /// Load a previously exported snapshot into the current page context.
    async fn import_session(&self, state: &serde_json::Value) -> Result<()>;

    /// Release the underlying browser. Default: nothing to release.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: BrowserPage + ?Sized> BrowserPage for Arc<T> {
    async fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url).await
    }

    async fn query_texts(&self, selector: &str) -> Result<Vec<String>> {
        (**self).query_texts(selector).await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        (**self).evaluate(script).await
    }

    async fn current_url(&self) -> Result<String> {
        (**self).current_url().await
    }

    async fn export_session(&self) -> Result<serde_json::Value> {
        (**self).export_session().await
    }

    async fn import_session(&self, state: &serde_json::Value) -> Result<()> {
        (**self).import_session(state).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

// ---------------------------------------------------------------------------
// SentimentModel
// ---------------------------------------------------------------------------

/// Raw model output before the confidence policy is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[async_trait]
pub trait SentimentModel: Send + Sync {
    async fn predict(&self, text: &str) -> Result<Prediction>;
    fn name(&self) -> &str;
}

#[async_trait]
impl SentimentModel for sentiment_client::SentimentClient {
    async fn predict(&self, text: &str) -> Result<Prediction> {
        let top = self.classify(text).await?;
        Ok(Prediction::new(top.label, top.score))
    }

    fn name(&self) -> &str {
        self.model()
    }
}

// ---------------------------------------------------------------------------
// ReportSink
// ---------------------------------------------------------------------------

pub trait ReportSink: Send + Sync {
    /// Persist the full report in one go. Either every row lands or none do.
    fn write(&self, rows: &[ClassifiedRecord]) -> Result<()>;
    fn describe(&self) -> String;
}

impl<T: ReportSink + ?Sized> ReportSink for Arc<T> {
    fn write(&self, rows: &[ClassifiedRecord]) -> Result<()> {
        (**self).write(rows)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
