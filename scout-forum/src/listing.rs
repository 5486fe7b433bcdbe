//! Listing wire format
//!
//! Every listing endpoint wraps its items as
//! `{"kind": "Listing", "data": {"children": [{"kind", "data"}], "after"}}`.

use serde::Deserialize;

use scout_core::Post;

#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
    /// Cursor for the next page, absent on the last page
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

/// Link (`t3`) payload fields the pipeline uses
#[derive(Debug, Clone, Deserialize)]
pub struct LinkData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub created_utc: Option<f64>,
}

/// Subreddit (`t5`) payload fields used by forum search
#[derive(Debug, Clone, Deserialize)]
pub struct SubredditData {
    pub display_name: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
}

pub const LINK_KIND: &str = "t3";
pub const SUBREDDIT_KIND: &str = "t5";

impl LinkData {
    /// Convert into a [`Post`] sampled from `forum`.
    ///
    /// A missing author is reported as the deleted placeholder.
    pub fn into_post(self, forum: &str) -> Post {
        Post {
            id: self.id,
            author: self
                .author
                .unwrap_or_else(|| scout_core::DELETED_AUTHOR.to_string()),
            score: self.score,
            forum: self.subreddit.unwrap_or_else(|| forum.to_string()),
            title: self.title,
            permalink: self.permalink,
            created_utc: self.created_utc,
        }
    }
}

impl Listing<LinkData> {
    /// Posts on this page, ignoring anything that is not a link
    pub fn into_posts(self, forum: &str) -> (Vec<Post>, Option<String>) {
        let posts = self
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == LINK_KIND)
            .map(|thing| thing.data.into_post(forum))
            .collect();
        (posts, self.data.after)
    }
}

impl Listing<SubredditData> {
    pub fn into_names(self) -> (Vec<String>, Option<String>) {
        let names = self
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == SUBREDDIT_KIND)
            .map(|thing| thing.data.display_name)
            .collect();
        (names, self.data.after)
    }
}
