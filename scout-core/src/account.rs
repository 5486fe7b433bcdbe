//! Posts, candidates and persisted account records
//!
//! A [`Candidate`] is one run's measurement of an account. An
//! [`AccountRecord`] is what the registry keeps: the latest measurement plus
//! the first-seen and last-updated timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single post sampled from a forum listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Upstream post id
    pub id: String,
    /// Author handle, case-sensitive as returned upstream
    pub author: String,
    /// Post score (karma), may be negative
    pub score: i64,
    /// Forum the post was sampled from
    pub forum: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    /// Creation time as seconds since the epoch
    #[serde(default)]
    pub created_utc: Option<f64>,
}

impl Post {
    pub fn new(id: &str, author: &str, score: i64, forum: &str) -> Self {
        Self {
            id: id.to_string(),
            author: author.to_string(),
            score,
            forum: forum.to_string(),
            title: None,
            permalink: None,
            created_utc: None,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_permalink(mut self, permalink: &str) -> Self {
        self.permalink = Some(permalink.to_string());
        self
    }
}

/// An account that passed the thresholds of the current run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub handle: String,
    pub post_count: u64,
    pub karma_sum: i64,
    pub forums: BTreeSet<String>,
    pub forum_activity: BTreeMap<String, u64>,
    /// Always `forum_activity.len()`
    pub cross_forum_score: u64,
}

impl Candidate {
    /// Per-forum activity rendered as `forum: N posts` lines
    pub fn activity_lines(&self) -> Vec<String> {
        self.forum_activity
            .iter()
            .map(|(forum, count)| format!("{}: {} posts", forum, count))
            .collect()
    }
}

/// One persisted registry entry
///
/// Field aliases accept the legacy registry layout (`username`, `posts`,
/// `karma`, `subreddits`, ...) so an existing data file can be adopted as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(alias = "username")]
    pub handle: String,
    #[serde(alias = "posts")]
    pub post_count: u64,
    #[serde(alias = "karma")]
    pub karma_sum: i64,
    #[serde(alias = "subreddits", default)]
    pub forums: BTreeSet<String>,
    #[serde(alias = "crossSubredditActivity", default)]
    pub forum_activity: BTreeMap<String, u64>,
    #[serde(alias = "crossSubredditScore", default)]
    pub cross_forum_score: u64,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl AccountRecord {
    /// Create a record for a handle persisted for the first time
    pub fn from_candidate(candidate: &Candidate, now: DateTime<Utc>) -> Self {
        Self {
            handle: candidate.handle.clone(),
            post_count: candidate.post_count,
            karma_sum: candidate.karma_sum,
            forums: candidate.forums.clone(),
            forum_activity: candidate.forum_activity.clone(),
            cross_forum_score: candidate.forum_activity.len() as u64,
            first_seen: now,
            last_updated: now,
        }
    }

    /// Replace every mutable field with the candidate's measurement.
    ///
    /// `first_seen` is never touched; `last_updated` never moves before it.
    pub fn apply(&mut self, candidate: &Candidate, now: DateTime<Utc>) {
        self.post_count = candidate.post_count;
        self.karma_sum = candidate.karma_sum;
        self.forums = candidate.forums.clone();
        self.forum_activity = candidate.forum_activity.clone();
        self.cross_forum_score = candidate.forum_activity.len() as u64;
        self.last_updated = now.max(self.first_seen);
    }

    /// Restore derived invariants on a record read from storage
    pub fn normalize(&mut self) {
        self.cross_forum_score = self.forum_activity.len() as u64;
        if self.last_updated < self.first_seen {
            self.last_updated = self.first_seen;
        }
    }
}

/// Sort records by karma sum, highest first. Stable for equal karma.
pub fn sort_by_karma(records: &mut [AccountRecord]) {
    records.sort_by(|a, b| b.karma_sum.cmp(&a.karma_sum));
}
