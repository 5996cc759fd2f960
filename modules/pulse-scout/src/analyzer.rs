use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use pulse_common::{ClassifiedRecord, CommentRecord, PulseError};

use crate::classifier::SentimentClassifier;
use crate::pipeline::RunPhase;
use crate::progress::Progress;
use crate::wait;

/// Output of one `analyze` call.
#[derive(Debug)]
pub struct Analysis {
    pub rows: Vec<ClassifiedRecord>,
    /// Records that fell back to Neutral during this call only.
    pub failures: usize,
}

/// Classifies harvested comments one at a time, in harvest order.
pub struct BatchAnalyzer {
    classifier: Arc<SentimentClassifier>,
}

impl BatchAnalyzer {
    pub fn new(classifier: Arc<SentimentClassifier>) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &SentimentClassifier {
        &self.classifier
    }

    /// Sequential on purpose: the model call is the bottleneck and output
    /// order must match input order. Only cancellation ends it early.
    pub async fn analyze(
        &self,
        records: Vec<CommentRecord>,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Analysis, PulseError> {
        let total = records.len();
        // The classifier's counter spans its whole lifetime; a pipeline runs many times.
        let failures_before = self.classifier.failure_count();
        let mut classified = Vec::with_capacity(total);

        for (i, record) in records.into_iter().enumerate() {
            let result = wait::or_cancel(cancel, self.classifier.classify(&record.text)).await?;
            classified.push(ClassifiedRecord::new(record, result));
            progress
                .report(RunPhase::Classifying, format!("Classified {}/{}", i + 1, total))
                .await;
        }

        let failures = self.classifier.failure_count().saturating_sub(failures_before);
        info!(
            total,
            failures,
            model = self.classifier.model_name(),
            "Classification finished"
        );
        Ok(Analysis {
            rows: classified,
            failures,
        })
    }
}
