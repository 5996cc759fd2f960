use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use pulse_common::config::ClassifierConfig;
use pulse_common::{Classification, SentimentClass};

use crate::traits::SentimentModel;

/// Confidence-thresholded three-way sentiment policy over a raw model.
///
/// Built once per run and shared read-only. Inference failures never escape:
/// they come back as `Classification::fallback()` and are counted.
pub struct SentimentClassifier {
    model: Arc<dyn SentimentModel>,
    threshold: f64,
    max_chars: usize,
    failures: AtomicUsize,
}

impl SentimentClassifier {
    pub fn new(model: Arc<dyn SentimentModel>, config: &ClassifierConfig) -> Self {
        Self {
            model,
            threshold: config.threshold,
            max_chars: config.max_chars,
            failures: AtomicUsize::new(0),
        }
    }

    pub async fn classify(&self, text: &str) -> Classification {
        let input = truncate_chars(text, self.max_chars);

        match self.model.predict(input).await {
            Ok(prediction) if prediction.score.is_finite() => {
                let result = apply_threshold(&prediction.label, prediction.score, self.threshold);
                debug!(
                    label = %prediction.label,
                    score = prediction.score,
                    sentiment = %result.sentiment,
                    "Classified comment"
                );
                result
            }
            Ok(prediction) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    model = self.model.name(),
                    label = %prediction.label,
                    "Model returned a non-finite score, falling back to neutral"
                );
                Classification::fallback()
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    model = self.model.name(),
                    error = %e,
                    "Inference failed, falling back to neutral"
                );
                Classification::fallback()
            }
        }
    }

    /// Number of inputs that fell back to neutral because inference failed.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

/// Low-confidence predictions are never trusted to be polarized.
pub fn apply_threshold(label: &str, score: f64, threshold: f64) -> Classification {
    let confidence = score.clamp(0.0, 1.0);
    let sentiment = if confidence < threshold {
        SentimentClass::Neutral
    } else {
        match label {
            "Positive" => SentimentClass::Positive,
            "Negative" => SentimentClass::Negative,
            _ => SentimentClass::Neutral,
        }
    };
    Classification {
        sentiment,
        confidence,
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
