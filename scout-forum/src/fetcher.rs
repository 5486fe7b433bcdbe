//! Rate-limited fetching
//!
//! One forum at a time, with categorized failure handling:
//! - Rate limits retry with a linear backoff (`attempt x step`)
//! - Not found, banned, private and forbidden forums are skipped at once
//! - Anything else is recorded and skipped
//!
//! A forum's failure never surfaces as an error; it becomes an
//! [`FetchOutcome::Abandoned`] report and the sweep moves on.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use scout_core::{ListingPlan, Pacing, Post, DEFAULT_POST_LIMIT};

use crate::{FailureKind, SharedSource};

/// Default number of attempts per forum
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff step between rate-limited attempts
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(60);

/// Retry policy for rate-limited forums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per forum, including the first
    pub max_attempts: u32,
    /// Backoff unit; the wait after attempt `n` is `n * backoff_step`
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
        }
    }

    /// Wait after the given failed attempt (1-based), linear and uncapped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Why a forum was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// Still rate limited after the last attempt
    RateLimited,
    /// Not found, banned, private or forbidden
    Unavailable(String),
    /// Network or other failure
    Failed(String),
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::RateLimited => write!(f, "rate limited"),
            AbandonReason::Unavailable(detail) => write!(f, "unavailable: {}", detail),
            AbandonReason::Failed(detail) => write!(f, "failed: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Vec<Post>),
    Abandoned(AbandonReason),
}

/// What happened while fetching one forum
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub forum: String,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Backoff waits taken between attempts, in order
    pub backoffs: Vec<Duration>,
    pub outcome: FetchOutcome,
}

impl FetchReport {
    pub fn posts(&self) -> &[Post] {
        match &self.outcome {
            FetchOutcome::Fetched(posts) => posts,
            FetchOutcome::Abandoned(_) => &[],
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Abandoned(_))
    }
}

/// Fetches forums one by one with retry and pacing
pub struct RateLimitedFetcher {
    source: SharedSource,
    policy: RetryPolicy,
    pacing: Arc<dyn Pacing>,
    limit: usize,
}

impl RateLimitedFetcher {
    pub fn new(source: SharedSource, policy: RetryPolicy, pacing: Arc<dyn Pacing>) -> Self {
        Self {
            source,
            policy,
            pacing,
            limit: DEFAULT_POST_LIMIT,
        }
    }

    /// Maximum posts requested per forum
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch one forum, retrying only on rate limits
    pub async fn fetch(&self, forum: &str, plan: ListingPlan) -> FetchReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let mut backoffs = Vec::new();

        info!(
            "Fetching up to {} {} posts from {}",
            self.limit, plan, forum
        );

        let outcome = loop {
            attempts += 1;

            let err = match self.source.fetch_posts(forum, plan, self.limit).await {
                Ok(posts) => {
                    if posts.is_empty() {
                        info!("No posts found in {}", forum);
                    } else {
                        info!("Fetched {} posts from {}", posts.len(), forum);
                    }
                    break FetchOutcome::Fetched(posts);
                }
                Err(err) => err,
            };

            match err.kind() {
                FailureKind::RateLimited if attempts < max_attempts => {
                    let wait = self.policy.backoff_for(attempts);
                    warn!(
                        "Rate limit hit for {}. Waiting {}s before retrying (attempt {}/{})",
                        forum,
                        wait.as_secs(),
                        attempts,
                        max_attempts
                    );
                    backoffs.push(wait);
                    tokio::time::sleep(wait).await;
                }
                FailureKind::RateLimited => {
                    warn!(
                        "Rate limit persists for {} after {} attempts. Skipping",
                        forum, attempts
                    );
                    break FetchOutcome::Abandoned(AbandonReason::RateLimited);
                }
                FailureKind::Unavailable => {
                    warn!("Forum {} is unavailable ({}). Skipping", forum, err);
                    break FetchOutcome::Abandoned(AbandonReason::Unavailable(err.to_string()));
                }
                FailureKind::Transient => {
                    error!("Error fetching forum {}: {}", forum, err);
                    break FetchOutcome::Abandoned(AbandonReason::Failed(err.to_string()));
                }
            }
        };

        FetchReport {
            forum: forum.to_string(),
            attempts,
            backoffs,
            outcome,
        }
    }

    /// Fetch every forum in order, pacing between forums.
    ///
    /// `visit` sees each report as soon as its forum is done.
    pub async fn sweep<F>(&self, forums: &[String], plan: ListingPlan, mut visit: F) -> SweepStats
    where
        F: FnMut(FetchReport),
    {
        let mut stats = SweepStats::default();

        for (i, forum) in forums.iter().enumerate() {
            let report = self.fetch(forum, plan).await;

            stats.attempted += 1;
            if report.is_abandoned() {
                stats.abandoned += 1;
            } else {
                stats.fetched += 1;
                stats.posts += report.posts().len();
            }
            visit(report);

            if i + 1 < forums.len() {
                let delay = self.pacing.next_delay();
                debug!("Pacing {}ms before next forum", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }

        stats
    }
}

/// Totals for one sweep over the forum list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub attempted: usize,
    pub fetched: usize,
    pub abandoned: usize,
    pub posts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForumError, ForumSource};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use scout_core::{FixedPacing, NoPacing};
    use std::collections::{HashMap, VecDeque};

    /// Scripted responses per forum; an exhausted script keeps rate limiting
    struct ScriptedSource {
        scripts: Mutex<HashMap<String, VecDeque<Result<Vec<Post>, ForumError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn script(self, forum: &str, responses: Vec<Result<Vec<Post>, ForumError>>) -> Self {
            self.scripts
                .lock()
                .insert(forum.to_string(), responses.into_iter().collect());
            self
        }

        fn calls_for(&self, forum: &str) -> usize {
            self.calls.lock().iter().filter(|f| *f == forum).count()
        }
    }

    #[async_trait]
    impl ForumSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_posts(
            &self,
            forum: &str,
            _plan: ListingPlan,
            _limit: usize,
        ) -> Result<Vec<Post>, ForumError> {
            self.calls.lock().push(forum.to_string());
            self.scripts
                .lock()
                .get_mut(forum)
                .and_then(|script| script.pop_front())
                .unwrap_or_else(|| Err(ForumError::RateLimited("scripted".to_string())))
        }

        async fn search_forums(&self, _keyword: &str, _limit: usize) -> Result<Vec<String>, ForumError> {
            Ok(Vec::new())
        }

        fn profile_url(&self, handle: &str) -> String {
            format!("https://example.test/u/{}", handle)
        }
    }

    fn rate_limited() -> Result<Vec<Post>, ForumError> {
        Err(ForumError::RateLimited("429".to_string()))
    }

    fn batch(forum: &str, n: usize) -> Result<Vec<Post>, ForumError> {
        Ok((0..n)
            .map(|i| Post::new(&i.to_string(), "alice", 100, forum))
            .collect())
    }

    fn fetcher(source: Arc<ScriptedSource>) -> RateLimitedFetcher {
        RateLimitedFetcher::new(source, RetryPolicy::default(), Arc::new(NoPacing))
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(120));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_three_times_then_success() {
        let source = Arc::new(ScriptedSource::new().script(
            "X",
            vec![rate_limited(), rate_limited(), rate_limited(), batch("X", 6)],
        ));
        let fetcher = fetcher(source.clone());

        let start = tokio::time::Instant::now();
        let report = fetcher.fetch("X", ListingPlan::default()).await;

        assert_eq!(report.attempts, 4);
        assert_eq!(
            report.backoffs,
            vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(180)
            ]
        );
        assert_eq!(report.posts().len(), 6);
        assert!(start.elapsed() >= Duration::from_secs(360));
        assert_eq!(source.calls_for("X"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_abandons_after_max_attempts() {
        let source = Arc::new(ScriptedSource::new());
        let fetcher = fetcher(source.clone());

        let report = fetcher.fetch("busy", ListingPlan::default()).await;

        assert_eq!(report.attempts, 5);
        assert_eq!(report.backoffs.len(), 4);
        assert_eq!(
            report.outcome,
            FetchOutcome::Abandoned(AbandonReason::RateLimited)
        );
        assert_eq!(source.calls_for("busy"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_abandons_without_retry() {
        let source = Arc::new(
            ScriptedSource::new()
                .script("Y", vec![Err(ForumError::Forbidden("private".to_string()))])
                .script("Z", vec![batch("Z", 2)]),
        );
        let fetcher = fetcher(source.clone());

        let mut reports = Vec::new();
        let forums = vec!["Y".to_string(), "Z".to_string()];
        let stats = fetcher
            .sweep(&forums, ListingPlan::default(), |r| reports.push(r))
            .await;

        assert_eq!(reports[0].attempts, 1);
        assert!(reports[0].backoffs.is_empty());
        assert!(matches!(
            reports[0].outcome,
            FetchOutcome::Abandoned(AbandonReason::Unavailable(_))
        ));
        assert_eq!(source.calls_for("Y"), 1);
        assert_eq!(reports[1].posts().len(), 2);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.posts, 2);
    }

    #[tokio::test]
    async fn test_not_found_and_other_errors_skip() {
        let source = Arc::new(
            ScriptedSource::new()
                .script("gone", vec![Err(ForumError::NotFound("banned".to_string()))])
                .script("broken", vec![Err(ForumError::Parse("bad json".to_string()))]),
        );
        let fetcher = fetcher(source.clone());

        let gone = fetcher.fetch("gone", ListingPlan::default()).await;
        let broken = fetcher.fetch("broken", ListingPlan::default()).await;

        assert!(matches!(
            gone.outcome,
            FetchOutcome::Abandoned(AbandonReason::Unavailable(_))
        ));
        assert!(matches!(
            broken.outcome,
            FetchOutcome::Abandoned(AbandonReason::Failed(_))
        ));
        assert_eq!(source.calls_for("gone"), 1);
        assert_eq!(source.calls_for("broken"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_paces_between_forums_only() {
        let source = Arc::new(
            ScriptedSource::new()
                .script("a", vec![batch("a", 1)])
                .script("b", vec![batch("b", 1)])
                .script("c", vec![batch("c", 1)]),
        );
        let fetcher = RateLimitedFetcher::new(
            source,
            RetryPolicy::default(),
            Arc::new(FixedPacing(Duration::from_secs(5))),
        );

        let forums: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let start = tokio::time::Instant::now();
        let stats = fetcher.sweep(&forums, ListingPlan::default(), |_| {}).await;

        assert_eq!(stats.attempted, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_empty_listing_is_success() {
        let source = Arc::new(ScriptedSource::new().script("quiet", vec![Ok(Vec::new())]));
        let report = fetcher(source).fetch("quiet", ListingPlan::default()).await;

        assert_eq!(report.outcome, FetchOutcome::Fetched(Vec::new()));
        assert_eq!(report.attempts, 1);
    }
}
