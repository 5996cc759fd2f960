use pulse_common::{ClassifiedRecord, SentimentClass};

use crate::harvester::{HarvestStats, StopReason};

/// Stats from one harvesting run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub session_restored: bool,
    pub manual_login: bool,
    pub harvest_rounds: usize,
    pub comments_collected: usize,
    pub duplicates_skipped: usize,
    pub placeholders_skipped: usize,
    pub empty_skipped: usize,
    pub unpaired_dropped: usize,
    pub stop_reason: Option<StopReason>,
    pub classification_failures: usize,
    pub by_class: [usize; 3], // Positive, Negative, Neutral
}

impl RunStats {
    pub fn record_harvest(&mut self, stats: &HarvestStats, collected: usize, stop: StopReason) {
        self.harvest_rounds = stats.rounds;
        self.comments_collected = collected;
        self.duplicates_skipped = stats.skipped_duplicate;
        self.placeholders_skipped = stats.skipped_placeholder;
        self.empty_skipped = stats.skipped_empty;
        self.unpaired_dropped = stats.dropped_unpaired;
        self.stop_reason = Some(stop);
    }

    pub fn record_classified(&mut self, rows: &[ClassifiedRecord], failures: usize) {
        self.classification_failures = failures;
        self.by_class = [0; 3];
        for row in rows {
            let slot = match row.sentiment {
                SentimentClass::Positive => 0,
                SentimentClass::Negative => 1,
                SentimentClass::Neutral => 2,
            };
            self.by_class[slot] += 1;
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Run Complete ===")?;
        let login = if self.session_restored {
            "restored session"
        } else if self.manual_login {
            "manual login"
        } else {
            "none"
        };
        writeln!(f, "Login:              {login}")?;
        writeln!(f, "Scroll rounds:      {}", self.harvest_rounds)?;
        if let Some(stop) = self.stop_reason {
            writeln!(f, "Stopped because:    {stop:?}")?;
        }
        writeln!(f, "Comments collected: {}", self.comments_collected)?;
        writeln!(f, "Duplicates skipped: {}", self.duplicates_skipped)?;
        writeln!(f, "Placeholders:       {}", self.placeholders_skipped)?;
        writeln!(f, "Empty texts:        {}", self.empty_skipped)?;
        writeln!(f, "Unpaired elements:  {}", self.unpaired_dropped)?;
        writeln!(f, "\nBy sentiment:")?;
        writeln!(f, "  Positive: {}", self.by_class[0])?;
        writeln!(f, "  Negative: {}", self.by_class[1])?;
        writeln!(f, "  Neutral:  {}", self.by_class[2])?;
        if self.classification_failures > 0 {
            writeln!(
                f,
                "  ({} fell back to neutral after inference errors)",
                self.classification_failures
            )?;
        }
        Ok(())
    }
}
