//! Threshold filtering and karma ranking of a run's accounts

use serde::{Deserialize, Serialize};

use crate::{Candidate, RunAccumulator, DEFAULT_MIN_KARMA, DEFAULT_MIN_POSTS};

/// Minimum activity for an account to become a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankThresholds {
    pub min_posts: u64,
    pub min_karma: i64,
}

impl Default for RankThresholds {
    fn default() -> Self {
        Self {
            min_posts: DEFAULT_MIN_POSTS,
            min_karma: DEFAULT_MIN_KARMA,
        }
    }
}

/// Turns a finished accumulator into ranked candidates
#[derive(Debug, Clone, Default)]
pub struct RankFilter {
    thresholds: RankThresholds,
}

impl RankFilter {
    pub fn new(thresholds: RankThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> RankThresholds {
        self.thresholds
    }

    /// Keep accounts meeting both thresholds, sorted by karma sum descending.
    ///
    /// The sort is stable: equal karma keeps accumulator insertion order.
    pub fn rank(&self, acc: RunAccumulator) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = acc
            .into_entries()
            .into_iter()
            .map(|(handle, activity)| Candidate {
                handle,
                post_count: activity.post_count,
                karma_sum: activity.karma_sum,
                cross_forum_score: activity.forum_activity.len() as u64,
                forums: activity.forums,
                forum_activity: activity.forum_activity,
            })
            .filter(|c| {
                c.post_count >= self.thresholds.min_posts
                    && c.karma_sum >= self.thresholds.min_karma
            })
            .collect();

        candidates.sort_by(|a, b| b.karma_sum.cmp(&a.karma_sum));
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActivityAggregator, Post};

    fn accumulate(batches: &[(&str, &[(&str, i64)])]) -> RunAccumulator {
        let aggregator = ActivityAggregator::new();
        let mut acc = RunAccumulator::new();
        for (forum, authors) in batches {
            let posts: Vec<Post> = authors
                .iter()
                .map(|(author, score)| Post::new("id", author, *score, forum))
                .collect();
            aggregator.ingest(&mut acc, forum, &posts);
        }
        acc
    }

    #[test]
    fn test_rank_filters_by_thresholds() {
        let acc = accumulate(&[(
            "SaaS",
            &[
                // four posts, plenty of karma: too few posts
                ("few", 1000), ("few", 1000), ("few", 1000), ("few", 1000),
                // five posts, 499 karma: not enough karma
                ("low", 100), ("low", 100), ("low", 100), ("low", 100), ("low", 99),
                // five posts, exactly 500 karma: passes
                ("ok", 100), ("ok", 100), ("ok", 100), ("ok", 100), ("ok", 100),
            ],
        )]);

        let ranked = RankFilter::default().rank(acc);
        let handles: Vec<_> = ranked.iter().map(|c| c.handle.as_str()).collect();
        assert_eq!(handles, vec!["ok"]);
    }

    #[test]
    fn test_rank_sorts_by_karma_with_stable_ties() {
        let acc = accumulate(&[("a", &[("first", 10), ("second", 10), ("third", 30)])]);
        let filter = RankFilter::new(RankThresholds {
            min_posts: 1,
            min_karma: 0,
        });

        let ranked = filter.rank(acc);
        let handles: Vec<_> = ranked.iter().map(|c| c.handle.as_str()).collect();
        assert_eq!(handles, vec!["third", "first", "second"]);
    }

    #[test]
    fn test_cross_forum_score_matches_activity() {
        let acc = accumulate(&[
            ("a", &[("alice", 200), ("alice", 200), ("alice", 200)]),
            ("b", &[("alice", 200), ("alice", 200)]),
        ]);

        let ranked = RankFilter::default().rank(acc);
        assert_eq!(ranked.len(), 1);
        for candidate in &ranked {
            assert_eq!(
                candidate.cross_forum_score,
                candidate.forum_activity.len() as u64
            );
        }
        assert_eq!(ranked[0].cross_forum_score, 2);
    }

    #[test]
    fn test_rank_empty_accumulator() {
        assert!(RankFilter::default().rank(RunAccumulator::new()).is_empty());
    }

    #[test]
    fn test_negative_karma_filtered() {
        let acc = accumulate(&[(
            "a",
            &[("neg", -10), ("neg", -10), ("neg", -10), ("neg", -10), ("neg", -10)],
        )]);
        assert!(RankFilter::default().rank(acc).is_empty());
    }
}
