use serde::{Deserialize, Serialize};

/// Request body for a text-classification endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationInput<'a> {
    pub inputs: &'a str,
    pub options: InferenceOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceOptions {
    /// Block until a cold model is loaded instead of failing with 503.
    pub wait_for_model: bool,
}

/// One scored label from the model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Hosted pipelines answer either `[[{..}]]` (batched) or `[{..}]` (single).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ClassificationOutput {
    Batched(Vec<Vec<LabelScore>>),
    Single(Vec<LabelScore>),
}

impl ClassificationOutput {
    /// The highest-scoring label for the first (only) input.
    pub(crate) fn top(self) -> Option<LabelScore> {
        let labels = match self {
            ClassificationOutput::Batched(batches) => batches.into_iter().next()?,
            ClassificationOutput::Single(labels) => labels,
        };
        labels
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batched_output_picks_highest_score() {
        let body = r#"[[{"label":"Negative","score":0.12},{"label":"Positive","score":0.88}]]"#;
        let output: ClassificationOutput = serde_json::from_str(body).unwrap();
        let top = output.top().unwrap();
        assert_eq!(top.label, "Positive");
        assert!((top.score - 0.88).abs() < 1e-9);
    }

    #[test]
    fn single_output_is_accepted() {
        let body = r#"[{"label":"Negative","score":0.97}]"#;
        let output: ClassificationOutput = serde_json::from_str(body).unwrap();
        assert_eq!(output.top().unwrap().label, "Negative");
    }

    #[test]
    fn empty_output_has_no_top_label() {
        let output: ClassificationOutput = serde_json::from_str("[]").unwrap();
        assert!(output.top().is_none());
    }
}
