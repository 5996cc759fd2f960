//! One harvesting run as an explicit state machine:
//!
//! Idle → AwaitingLogin → Harvesting → Classifying → Done
//!                                   ↘ Done (nothing found)
//! any non-terminal phase → Failed(kind)
//!
//! A failed run never writes a report.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pulse_common::{ClassifiedRecord, Config, FailureKind, PulseError};

use crate::analyzer::BatchAnalyzer;
use crate::classifier::SentimentClassifier;
use crate::harvester::CommentHarvester;
use crate::login::LoginWaiter;
use crate::progress::Progress;
use crate::report::{summarize, SentimentSummary};
use crate::session::SessionStore;
use crate::stats::RunStats;
use crate::traits::{BrowserPage, ReportSink, SentimentModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    AwaitingLogin,
    Harvesting,
    Classifying,
    Done,
    Failed(FailureKind),
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed(_))
    }

    pub fn can_transition_to(&self, next: &RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Idle, AwaitingLogin) => true,
            (AwaitingLogin, Harvesting) => true,
            (Harvesting, Classifying) | (Harvesting, Done) => true,
            (Classifying, Done) => true,
            (from, Failed(_)) => !from.is_terminal(),
            (Done, Idle) | (Failed(_), Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => f.write_str("idle"),
            RunPhase::AwaitingLogin => f.write_str("awaiting_login"),
            RunPhase::Harvesting => f.write_str("harvesting"),
            RunPhase::Classifying => f.write_str("classifying"),
            RunPhase::Done => f.write_str("done"),
            RunPhase::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub url: String,
    pub rows: Vec<ClassifiedRecord>,
    pub summary: SentimentSummary,
    pub stats: RunStats,
    /// Where the sink put the report.
    pub location: String,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// The harvest finished normally but found no comments.
    NothingFound { url: String, stats: RunStats },
}

pub const NOTHING_FOUND_MESSAGE: &str =
    "No comments found. Check that the post is public and that its comment section loaded.";

pub struct Pipeline {
    page: Box<dyn BrowserPage>,
    store: SessionStore,
    login: LoginWaiter,
    harvester: CommentHarvester,
    analyzer: BatchAnalyzer,
    sink: Box<dyn ReportSink>,
    phase: RunPhase,
}

impl Pipeline {
    pub fn new(
        page: Box<dyn BrowserPage>,
        store: SessionStore,
        login: LoginWaiter,
        harvester: CommentHarvester,
        analyzer: BatchAnalyzer,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        Self {
            page,
            store,
            login,
            harvester,
            analyzer,
            sink,
            phase: RunPhase::Idle,
        }
    }

    /// Wire every stage from configuration. The classifier is built once here
    /// and shared by reference for the whole analysis phase.
    pub fn from_config(
        config: &Config,
        page: Box<dyn BrowserPage>,
        model: Arc<dyn SentimentModel>,
        sink: Box<dyn ReportSink>,
    ) -> Result<Self, PulseError> {
        let classifier = Arc::new(SentimentClassifier::new(model, &config.classifier));
        Ok(Self::new(
            page,
            SessionStore::from_config(&config.session),
            LoginWaiter::new(config.site.clone(), config.login.clone()),
            CommentHarvester::new(config.harvest.clone())?,
            BatchAnalyzer::new(classifier),
            sink,
        ))
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    fn transition(&mut self, next: RunPhase) -> Result<(), PulseError> {
        if !self.phase.can_transition_to(&next) {
            return Err(PulseError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }

    pub async fn run(
        &mut self,
        url: &str,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PulseError> {
        if self.phase.is_terminal() {
            self.transition(RunPhase::Idle)?;
        }

        let result = self.execute(url, progress, cancel).await;

        if let Err(e) = &result {
            let failed = RunPhase::Failed(e.kind());
            if self.phase.can_transition_to(&failed) {
                self.phase = failed.clone();
            }
            error!(url, error = %e, "Run failed");
            progress.report(failed, format!("Run failed: {e}")).await;
        }
        result
    }

    async fn execute(
        &mut self,
        url: &str,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PulseError> {
        let mut stats = RunStats::default();

        self.transition(RunPhase::AwaitingLogin)?;
        self.authenticate(progress, cancel, &mut stats).await?;

        self.transition(RunPhase::Harvesting)?;
        let target = self.harvester.target_count();
        let harvest = self
            .harvester
            .harvest_detailed(self.page.as_ref(), url, target, progress, cancel)
            .await?;
        stats.record_harvest(&harvest.stats, harvest.records.len(), harvest.stop);

        if harvest.records.is_empty() {
            self.transition(RunPhase::Done)?;
            warn!(url, "Harvest found no comments");
            progress.report(RunPhase::Done, NOTHING_FOUND_MESSAGE).await;
            return Ok(RunOutcome::NothingFound {
                url: url.to_string(),
                stats,
            });
        }

        self.transition(RunPhase::Classifying)?;
        let analysis = self.analyzer.analyze(harvest.records, progress, cancel).await?;
        stats.record_classified(&analysis.rows, analysis.failures);
        let rows = analysis.rows;
        let summary = summarize(&rows);

        self.sink
            .write(&rows)
            .map_err(|e| PulseError::Report(format!("{e:#}")))?;
        let location = self.sink.describe();

        self.transition(RunPhase::Done)?;
        info!(url, rows = rows.len(), report = %location, "Run complete");
        progress
            .report(
                RunPhase::Done,
                format!("Saved {} rows to {location}", rows.len()),
            )
            .await;

        Ok(RunOutcome::Completed(RunReport {
            url: url.to_string(),
            rows,
            summary,
            stats,
            location,
        }))
    }

    /// Reuse the saved session when the site still accepts it, otherwise wait
    /// for a manual login and save the new session.
    async fn authenticate(
        &self,
        progress: &Progress,
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> Result<(), PulseError> {
        let page = self.page.as_ref();

        match self.store.load() {
            Some(session) => {
                if self.login.restore(page, &session, progress, cancel).await? {
                    stats.session_restored = true;
                    return Ok(());
                }
                self.discard_saved_session();
            }
            None => {
                // Corrupt or stale files are dropped too.
                self.discard_saved_session();
                progress
                    .report(
                        RunPhase::AwaitingLogin,
                        "No saved login session, manual login required",
                    )
                    .await;
            }
        }

        let session = self.login.await_login(page, progress, cancel).await?;
        stats.manual_login = true;
        if let Err(e) = self.store.save(&session) {
            warn!(error = %e, "Could not persist session, continuing with the live login");
        }
        Ok(())
    }

    fn discard_saved_session(&self) {
        if let Err(e) = self.store.invalidate() {
            warn!(error = %e, "Failed to discard saved session");
        }
    }

    /// Release the browser. Errors are logged, not returned.
    pub async fn close(&self) {
        if let Err(e) = self.page.close().await {
            warn!(error = %e, "Failed to close browser");
        }
    }
}
