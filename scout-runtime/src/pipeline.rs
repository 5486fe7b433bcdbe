//! Run-once pipeline
//!
//! One invocation: acquire the lease, read the registry snapshot, resolve
//! forums, then fetch -> aggregate -> rank -> merge -> notify. Forums are
//! processed strictly one after another.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use scout_core::{
    ActivityAggregator, Candidate, ListingPlan, Pacing, RandomPacing, RankFilter, RankThresholds,
    RankingMode, RunAccumulator, TimeWindow, DEFAULT_POST_LIMIT,
};
use scout_forum::{AbandonReason, ForumError, RateLimitedFetcher, RetryPolicy, SharedSource};
use scout_outreach::{
    snapshot_handles, DiffNotifier, MergeStats, NotifyReport, OutreachTemplate, RegistryError,
    RegistryMerger, SharedNotifier, SharedRegistry,
};

use crate::{LeaseError, RunLease};

/// Default keyword for forum discovery
pub const DEFAULT_KEYWORD: &str = "Entrepreneur";

/// Default number of forums taken from keyword discovery
pub const DEFAULT_KEYWORD_LIMIT: usize = 100;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Forum discovery failed: {0}")]
    Discovery(#[from] ForumError),

    #[error("Run lease error: {0}")]
    Lease(#[from] LeaseError),
}

/// What a run does, independent of its collaborators
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Explicit forums; keyword discovery is used when empty
    pub forums: Vec<String>,
    pub keyword: String,
    pub keyword_limit: usize,
    /// Ranking modes one is drawn from per run
    pub modes: Vec<RankingMode>,
    /// Time windows one is drawn from per run
    pub windows: Vec<TimeWindow>,
    /// Posts requested per forum
    pub post_limit: usize,
    pub thresholds: RankThresholds,
    /// Authors ignored besides the deleted placeholder and the automoderator
    pub excluded_authors: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forums: Vec::new(),
            keyword: DEFAULT_KEYWORD.to_string(),
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            modes: vec![RankingMode::Top],
            windows: vec![TimeWindow::All, TimeWindow::Year],
            post_limit: DEFAULT_POST_LIMIT,
            thresholds: RankThresholds::default(),
            excluded_authors: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub plan: ListingPlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub forums: Vec<String>,
    pub abandoned: Vec<(String, AbandonReason)>,
    pub posts_sampled: usize,
    pub accounts_seen: usize,
    /// Ranked candidates of this run
    pub candidates: Vec<Candidate>,
    pub merge: MergeStats,
    pub notify: NotifyReport,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<RunSummary>),
    /// Another run held the lease
    Skipped,
}

/// Deduplicate forum names case-insensitively, first spelling wins
pub fn dedupe_forums<I, S>(forums: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    forums
        .into_iter()
        .map(|f| f.as_ref().trim().trim_start_matches("r/").to_string())
        .filter(|f| !f.is_empty())
        .filter(|f| seen.insert(f.to_lowercase()))
        .collect()
}

/// The discovery pipeline
pub struct Pipeline {
    config: PipelineConfig,
    source: SharedSource,
    merger: RegistryMerger,
    notifier: SharedNotifier,
    pacing: Arc<dyn Pacing>,
    template: OutreachTemplate,
    lease: RunLease,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: SharedSource,
        registry: SharedRegistry,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            config,
            source,
            merger: RegistryMerger::new(registry),
            notifier,
            pacing: Arc::new(RandomPacing::default()),
            template: OutreachTemplate::default(),
            lease: RunLease::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Arc<dyn Pacing>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_template(mut self, template: OutreachTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_lease(mut self, lease: RunLease) -> Self {
        self.lease = lease;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Explicit forums when configured, keyword discovery otherwise
    pub async fn resolve_forums(&self) -> Result<Vec<String>, PipelineError> {
        if !self.config.forums.is_empty() {
            return Ok(dedupe_forums(&self.config.forums));
        }

        info!(
            "Searching {} for forums matching '{}'",
            self.source.name(),
            self.config.keyword
        );
        let found = self
            .source
            .search_forums(&self.config.keyword, self.config.keyword_limit)
            .await?;
        let forums = dedupe_forums(found);

        info!(
            "Found {} forums for keyword '{}': {}",
            forums.len(),
            self.config.keyword,
            forums.join(", ")
        );
        Ok(forums)
    }

    /// Execute one full run, or skip if another run holds the lease
    pub async fn run_once(&self) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();

        let Some(_ticket) = self.lease.acquire(&run_id).await? else {
            info!("Previous run still in progress, skipping this trigger");
            return Ok(RunOutcome::Skipped);
        };

        let started_at = Utc::now();
        info!("Starting run {}", run_id);

        // Read before any fetch: a corrupt registry aborts here
        let snapshot = self.merger.snapshot().await?;
        info!("Found {} existing users in the registry", snapshot.len());
        let known = snapshot_handles(&snapshot);

        let forums = self.resolve_forums().await?;
        if forums.is_empty() {
            warn!("No forums to process");
        }

        let plan = ListingPlan::random(&self.config.modes, &self.config.windows);
        info!("Using {} listing for this run", plan);

        let fetcher = RateLimitedFetcher::new(
            self.source.clone(),
            self.config.retry,
            self.pacing.clone(),
        )
        .with_limit(self.config.post_limit);
        let aggregator =
            ActivityAggregator::new().with_excluded(self.config.excluded_authors.iter().cloned());

        let mut acc = RunAccumulator::new();
        let mut abandoned = Vec::new();
        let sweep = fetcher
            .sweep(&forums, plan, |report| {
                let stats = aggregator.ingest(&mut acc, &report.forum, report.posts());
                if let scout_forum::FetchOutcome::Abandoned(reason) = report.outcome {
                    abandoned.push((report.forum, reason));
                } else {
                    info!(
                        "Completed processing {}. Found {} active users so far ({} posts skipped)",
                        report.forum,
                        acc.len(),
                        stats.skipped
                    );
                }
            })
            .await;

        let accounts_seen = acc.len();
        let candidates = RankFilter::new(self.config.thresholds).rank(acc);
        match candidates.first() {
            Some(top) => info!(
                "Found {} active users across {} forums. Top user: {} with {} karma",
                candidates.len(),
                forums.len(),
                top.handle,
                top.karma_sum
            ),
            None => info!(
                "No accounts met the thresholds across {} forums",
                forums.len()
            ),
        }

        let merge = self
            .merger
            .merge(snapshot, &candidates, Utc::now())
            .await?;

        let diff = DiffNotifier::new(self.notifier.clone(), self.pacing.clone())
            .with_template(self.template.clone());
        let location = self.merger.location();
        let notify = diff
            .dispatch(&known, &candidates, &location, |handle| {
                self.source.profile_url(handle)
            })
            .await;

        let summary = RunSummary {
            run_id,
            plan,
            started_at,
            finished_at: Utc::now(),
            forums,
            abandoned,
            posts_sampled: sweep.posts,
            accounts_seen,
            candidates,
            merge,
            notify,
        };
        info!(
            "Run {} finished: {} candidates, {} new, {} forums skipped",
            summary.run_id,
            summary.candidates.len(),
            summary.notify.new_accounts,
            summary.abandoned.len()
        );

        Ok(RunOutcome::Completed(Box::new(summary)))
    }
}
