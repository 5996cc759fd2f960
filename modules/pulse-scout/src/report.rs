use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use pulse_common::{ClassifiedRecord, SentimentClass};

use crate::session::parent_dir;
use crate::traits::ReportSink;

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Share of each sentiment class in percent. All three classes are always
/// present; an empty report is all zeros.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentSummary {
    pub total: usize,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

impl SentimentSummary {
    pub fn get(&self, class: SentimentClass) -> f64 {
        match class {
            SentimentClass::Positive => self.positive,
            SentimentClass::Negative => self.negative,
            SentimentClass::Neutral => self.neutral,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SentimentClass, f64)> + '_ {
        SentimentClass::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    pub fn sum(&self) -> f64 {
        self.positive + self.negative + self.neutral
    }
}

impl std::fmt::Display for SentimentSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sentiment distribution ({} comments):", self.total)?;
        for (class, share) in self.iter() {
            writeln!(f, "  {:<9} {:>6.2}%", class.as_str(), share)?;
        }
        Ok(())
    }
}

pub fn summarize(records: &[ClassifiedRecord]) -> SentimentSummary {
    let total = records.len();
    let share = |class: SentimentClass| {
        if total == 0 {
            return 0.0;
        }
        let count = records.iter().filter(|r| r.sentiment == class).count();
        count as f64 / total as f64 * 100.0
    };

    SentimentSummary {
        total,
        positive: share(SentimentClass::Positive),
        negative: share(SentimentClass::Negative),
        neutral: share(SentimentClass::Neutral),
    }
}

// ---------------------------------------------------------------------------
// CSV sink
// ---------------------------------------------------------------------------

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes the report as UTF-8 CSV with a BOM so spreadsheet tools pick the
/// right encoding for non-ASCII comments. The file appears all at once.
pub struct CsvReportSink {
    path: PathBuf,
}

impl CsvReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for CsvReportSink {
    fn write(&self, rows: &[ClassifiedRecord]) -> Result<()> {
        let dir = parent_dir(&self.path);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(UTF8_BOM)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(["author", "text", "sentiment", "confidence"])?;
            for row in rows {
                let confidence = format!("{:.4}", row.confidence);
                writer.write_record([
                    row.record.author.as_str(),
                    row.record.text.as_str(),
                    row.sentiment.as_str(),
                    confidence.as_str(),
                ])?;
            }
            writer.flush()?;
        }
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(path = %self.path.display(), rows = rows.len(), "Report written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::{Classification, CommentRecord};

    fn row(author: &str, text: &str, sentiment: SentimentClass, confidence: f64) -> ClassifiedRecord {
        ClassifiedRecord::new(
            CommentRecord::new(author, text),
            Classification {
                sentiment,
                confidence,
            },
        )
    }

    #[test]
    fn empty_input_reports_all_classes_at_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        for (_, share) in summary.iter() {
            assert_eq!(share, 0.0);
        }
        assert_eq!(summary.sum(), 0.0);
    }

    #[test]
    fn missing_classes_are_present_as_zero() {
        let rows = vec![
            row("a", "x", SentimentClass::Positive, 0.9),
            row("b", "y", SentimentClass::Positive, 0.8),
        ];
        let summary = summarize(&rows);
        assert_eq!(summary.positive, 100.0);
        assert_eq!(summary.negative, 0.0);
        assert_eq!(summary.neutral, 0.0);
    }

    #[test]
    fn shares_sum_to_one_hundred() {
        let classes = [
            SentimentClass::Positive,
            SentimentClass::Negative,
            SentimentClass::Neutral,
        ];
        for n in 1..=17 {
            let rows: Vec<_> = (0..n)
                .map(|i| row("u", "t", classes[(i * 7 + n) % 3], 0.7))
                .collect();
            let summary = summarize(&rows);
            assert!((summary.sum() - 100.0).abs() < 0.01, "n={n} sum={}", summary.sum());
        }
    }

    #[test]
    fn display_rounds_to_two_decimals() {
        let rows = vec![
            row("a", "x", SentimentClass::Positive, 0.9),
            row("b", "y", SentimentClass::Negative, 0.9),
            row("c", "z", SentimentClass::Neutral, 0.3),
        ];
        let text = summarize(&rows).to_string();
        assert!(text.contains("positive   33.33%"), "{text}");
        assert!(text.contains("3 comments"));
    }

    #[test]
    fn csv_keeps_non_ascii_and_escapes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvReportSink::new(dir.path().join("out/report.csv"));
        let rows = vec![
            row("小明", "太好了，支持！", SentimentClass::Positive, 0.93),
            row("bob", "line one, \"quoted\"\nline two", SentimentClass::Neutral, 0.0),
        ];

        sink.write(&rows).unwrap();

        let bytes = std::fs::read(sink.path()).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let body = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();

        let mut reader = csv::Reader::from_reader(body.as_bytes());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["author", "text", "sentiment", "confidence"]);
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "小明");
        assert_eq!(&records[0][1], "太好了，支持！");
        assert_eq!(&records[0][2], "positive");
        assert_eq!(&records[0][3], "0.9300");
        assert_eq!(&records[1][1], "line one, \"quoted\"\nline two");
    }
}
