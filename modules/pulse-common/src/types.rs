use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Sentiment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentClass {
    Positive,
    Negative,
    Neutral,
}

impl SentimentClass {
    /// Fixed report order.
    pub const ALL: [SentimentClass; 3] = [
        SentimentClass::Positive,
        SentimentClass::Negative,
        SentimentClass::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentClass::Positive => "positive",
            SentimentClass::Negative => "negative",
            SentimentClass::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SentimentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying a single text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub sentiment: SentimentClass,
    /// Raw model score in [0, 1]; 0.0 when inference failed.
    pub confidence: f64,
}

impl Classification {
    /// Fallback used when the model call fails.
    pub fn fallback() -> Self {
        Self {
            sentiment: SentimentClass::Neutral,
            confidence: 0.0,
        }
    }
}

// --- Harvested records ---

/// One (author, comment) pair scraped from a thread.
/// `text` is never empty and never a collapsed-thread placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentRecord {
    pub author: String,
    pub text: String,
}

impl CommentRecord {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }
}

/// A harvested comment with its sentiment. Report rows keep harvest order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub record: CommentRecord,
    pub sentiment: SentimentClass,
    pub confidence: f64,
}

impl ClassifiedRecord {
    pub fn new(record: CommentRecord, classification: Classification) -> Self {
        Self {
            record,
            sentiment: classification.sentiment,
            confidence: classification.confidence,
        }
    }
}

// --- Session ---

/// Persisted login state. `state` is whatever the browser driver exports
/// (a cookie list for WebDriver) and is never inspected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub state: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

impl Session {
    pub fn capture(state: serde_json::Value) -> Self {
        Self {
            state,
            captured_at: Utc::now(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.captured_at
    }
}
