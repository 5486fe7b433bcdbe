//! Per-run activity accumulation
//!
//! The accumulator belongs to exactly one pipeline run:
//! - Folded forum by forum as listings arrive
//! - Keeps handles in first-seen order so ranking ties stay stable
//! - Consumed by ranking, never shared across runs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{Post, AUTOMODERATOR, DELETED_AUTHOR};

/// Counters for one account within the current run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountActivity {
    pub post_count: u64,
    pub karma_sum: i64,
    pub forums: BTreeSet<String>,
    pub forum_activity: BTreeMap<String, u64>,
}

impl AccountActivity {
    fn record(&mut self, forum: &str, score: i64) {
        self.post_count += 1;
        self.karma_sum += score;
        self.forums.insert(forum.to_string());
        *self.forum_activity.entry(forum.to_string()).or_insert(0) += 1;
    }
}

/// Handle -> activity mapping for a single run
#[derive(Debug, Clone, Default)]
pub struct RunAccumulator {
    order: Vec<String>,
    entries: HashMap<String, AccountActivity>,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, handle: &str) -> Option<&AccountActivity> {
        self.entries.get(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.entries.contains_key(handle)
    }

    fn entry(&mut self, handle: &str) -> &mut AccountActivity {
        if !self.entries.contains_key(handle) {
            self.order.push(handle.to_string());
        }
        self.entries.entry(handle.to_string()).or_default()
    }

    /// Drain into `(handle, activity)` pairs in first-seen order
    pub fn into_entries(mut self) -> Vec<(String, AccountActivity)> {
        self.order
            .into_iter()
            .filter_map(|handle| {
                let activity = self.entries.remove(&handle)?;
                Some((handle, activity))
            })
            .collect()
    }
}

/// Result of folding one forum's batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Posts attributed to an account
    pub counted: usize,
    /// Posts by excluded authors
    pub skipped: usize,
}

/// Folds forum listings into a [`RunAccumulator`]
#[derive(Debug, Clone)]
pub struct ActivityAggregator {
    excluded: HashSet<String>,
}

impl Default for ActivityAggregator {
    fn default() -> Self {
        Self {
            excluded: [DELETED_AUTHOR, AUTOMODERATOR]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ActivityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude additional authors (exact, case-sensitive match)
    pub fn with_excluded<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(authors.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, author: &str) -> bool {
        author.is_empty() || self.excluded.contains(author)
    }

    /// Fold a batch of posts from `forum` into the accumulator
    pub fn ingest(&self, acc: &mut RunAccumulator, forum: &str, posts: &[Post]) -> IngestStats {
        let mut stats = IngestStats::default();

        for post in posts {
            if self.is_excluded(&post.author) {
                stats.skipped += 1;
                continue;
            }
            acc.entry(&post.author).record(forum, post.score);
            stats.counted += 1;
        }

        stats
    }
}
