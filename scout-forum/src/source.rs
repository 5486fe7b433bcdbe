//! Forum content source abstraction

use async_trait::async_trait;
use std::sync::Arc;

use scout_core::{ListingPlan, Post};

use crate::ForumError;

/// Anything that can list ranked posts for a forum
#[async_trait]
pub trait ForumSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &str;

    /// Up to `limit` posts of `forum`, ranked per `plan`
    async fn fetch_posts(
        &self,
        forum: &str,
        plan: ListingPlan,
        limit: usize,
    ) -> Result<Vec<Post>, ForumError>;

    /// Names of forums matching a keyword
    async fn search_forums(&self, keyword: &str, limit: usize) -> Result<Vec<String>, ForumError>;

    /// Public profile link for a handle
    fn profile_url(&self, handle: &str) -> String;
}

/// Shared reference to a forum source
pub type SharedSource = Arc<dyn ForumSource>;
