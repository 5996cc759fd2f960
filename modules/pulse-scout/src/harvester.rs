use std::collections::HashSet;

use regex::Regex;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pulse_common::config::HarvestConfig;
use pulse_common::{CommentRecord, PulseError};

use crate::pipeline::RunPhase;
use crate::progress::Progress;
use crate::traits::BrowserPage;
use crate::wait;

/// Why the scroll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// A query came back with no authors or no texts.
    Exhausted,
    /// Several rounds in a row added nothing new.
    Stalled,
    RoundLimit,
}

/// Counters for one harvest call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub rounds: usize,
    pub skipped_empty: usize,
    pub skipped_placeholder: usize,
    pub skipped_duplicate: usize,
    pub dropped_unpaired: usize,
}

#[derive(Debug)]
pub struct HarvestOutcome {
    pub records: Vec<CommentRecord>,
    pub stats: HarvestStats,
    pub stop: StopReason,
}

/// Loop state. Lives only for one `harvest` call.
struct HarvestState {
    records: Vec<CommentRecord>,
    seen: HashSet<String>,
    target: usize,
    last_batch_size: usize,
    idle_rounds: usize,
    stats: HarvestStats,
}

impl HarvestState {
    fn new(target: usize) -> Self {
        Self {
            records: Vec::new(),
            seen: HashSet::new(),
            target,
            last_batch_size: 0,
            idle_rounds: 0,
            stats: HarvestStats::default(),
        }
    }

    fn is_full(&self) -> bool {
        self.records.len() >= self.target
    }

    /// Pair authors and texts by position, filter, dedup and append up to the
    /// target. Returns how many records were added.
    fn accept_batch(
        &mut self,
        authors: Vec<String>,
        texts: Vec<String>,
        placeholder: &Regex,
    ) -> usize {
        let paired = authors.len().min(texts.len());
        self.stats.dropped_unpaired += authors.len().max(texts.len()) - paired;
        self.last_batch_size = paired;

        let before = self.records.len();
        for (author, text) in authors.into_iter().zip(texts) {
            if self.is_full() {
                break;
            }

            let author = author.trim();
            let text = text.trim();
            if text.is_empty() {
                self.stats.skipped_empty += 1;
                continue;
            }
            if placeholder.is_match(text) {
                self.stats.skipped_placeholder += 1;
                continue;
            }
            if !self.seen.insert(content_hash(author, text)) {
                self.stats.skipped_duplicate += 1;
                continue;
            }

            self.records.push(CommentRecord::new(author, text));
        }
        self.records.len() - before
    }
}

/// SHA-256 over author and text with a separator that cannot appear in either.
fn content_hash(author: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Scroll-and-extract loop over a dynamically loading comment thread.
pub struct CommentHarvester {
    config: HarvestConfig,
    placeholder: Regex,
}

impl CommentHarvester {
    pub fn new(config: HarvestConfig) -> Result<Self, PulseError> {
        let placeholder = Regex::new(&config.placeholder_pattern).map_err(|e| {
            PulseError::Config(format!(
                "Invalid placeholder pattern {:?}: {e}",
                config.placeholder_pattern
            ))
        })?;
        Ok(Self {
            config,
            placeholder,
        })
    }

    pub fn target_count(&self) -> usize {
        self.config.target_count
    }

    /// Collapsed-thread rows such as "共 5 条回复" are not comments.
    pub fn is_placeholder(&self, text: &str) -> bool {
        self.placeholder.is_match(text.trim())
    }

    pub async fn harvest(
        &self,
        page: &dyn BrowserPage,
        url: &str,
        target: usize,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<CommentRecord>, PulseError> {
        Ok(self
            .harvest_detailed(page, url, target, progress, cancel)
            .await?
            .records)
    }

    /// `harvest` plus loop counters and the stop reason.
    pub async fn harvest_detailed(
        &self,
        page: &dyn BrowserPage,
        url: &str,
        target: usize,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome, PulseError> {
        wait::or_cancel(cancel, page.navigate(url))
            .await?
            .map_err(|e| PulseError::Navigation {
                url: url.to_string(),
                message: format!("{e:#}"),
            })?;
        progress
            .report(RunPhase::Harvesting, format!("Opened {url}, waiting for comments to load"))
            .await;
        wait::sleep(self.config.initial_delay(), cancel).await?;

        let mut state = HarvestState::new(target);
        let stop = loop {
            if state.is_full() {
                break StopReason::TargetReached;
            }
            if self.config.max_rounds > 0 && state.stats.rounds >= self.config.max_rounds {
                break StopReason::RoundLimit;
            }
            state.stats.rounds += 1;
            wait::sleep(self.config.round_delay(), cancel).await?;

            let authors = self.query(page, &self.config.author_selector, cancel).await?;
            let texts = self.query(page, &self.config.text_selector, cancel).await?;
            debug!(
                round = state.stats.rounds,
                authors = authors.len(),
                texts = texts.len(),
                "Queried comment elements"
            );

            if authors.is_empty() || texts.is_empty() {
                break StopReason::Exhausted;
            }

            let added = state.accept_batch(authors, texts, &self.placeholder);
            progress
                .report(
                    RunPhase::Harvesting,
                    format!(
                        "Round {}: collected {}/{} comments ({} new)",
                        state.stats.rounds,
                        state.records.len(),
                        target,
                        added
                    ),
                )
                .await;

            if state.is_full() {
                break StopReason::TargetReached;
            }

            if added == 0 {
                state.idle_rounds += 1;
                if self.config.idle_rounds > 0 && state.idle_rounds >= self.config.idle_rounds {
                    break StopReason::Stalled;
                }
            } else {
                state.idle_rounds = 0;
            }

            wait::or_cancel(cancel, page.evaluate(&self.config.scroll_script))
                .await?
                .map_err(|e| PulseError::Browser(format!("Scroll failed: {e:#}")))?;
            wait::sleep(self.config.scroll_delay(), cancel).await?;
        };

        info!(
            url,
            collected = state.records.len(),
            target,
            rounds = state.stats.rounds,
            last_batch = state.last_batch_size,
            duplicates = state.stats.skipped_duplicate,
            placeholders = state.stats.skipped_placeholder,
            stop = ?stop,
            "Harvest finished"
        );
        progress
            .report(
                RunPhase::Harvesting,
                format!("Harvested {} comments", state.records.len()),
            )
            .await;

        Ok(HarvestOutcome {
            records: state.records,
            stats: state.stats,
            stop,
        })
    }

    async fn query(
        &self,
        page: &dyn BrowserPage,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, PulseError> {
        wait::or_cancel(cancel, page.query_texts(selector))
            .await?
            .map_err(|e| PulseError::Browser(format!("Query {selector:?} failed: {e:#}")))
    }
}
