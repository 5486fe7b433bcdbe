//! Reddit forum source
//!
//! Lists subreddit posts and searches subreddits over the JSON API:
//! - Anonymous mode against the public endpoints
//! - Script-app mode with a cached password-grant bearer token
//! - Cursor pagination up to the requested limit

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use scout_core::{ListingPlan, Post};

use crate::{
    classify_status, create_http_client, ForumError, ForumSource, LinkData, Listing,
    RedditConfig, SubredditData, PROFILE_URL_BASE,
};

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    name: String,
}

/// Reddit implementation of [`ForumSource`]
pub struct RedditSource {
    config: RedditConfig,
    client: Client,
    token: Mutex<Option<AccessToken>>,
    profile_base: String,
}

impl RedditSource {
    pub fn new(config: RedditConfig) -> Result<Self, ForumError> {
        let client = create_http_client(&config)?;
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
            profile_base: PROFILE_URL_BASE.to_string(),
        })
    }

    pub fn with_profile_base(mut self, profile_base: &str) -> Self {
        self.profile_base = profile_base.to_string();
        self
    }

    pub fn config(&self) -> &RedditConfig {
        &self.config
    }

    /// Bearer token for authenticated mode, `None` when anonymous
    async fn access_token(&self) -> Result<Option<String>, ForumError> {
        let Some(credentials) = &self.config.credentials else {
            return Ok(None);
        };

        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone());
        if cached.is_some() {
            return Ok(cached);
        }

        debug!("Requesting access token for {}", credentials.username);

        let response = self
            .client
            .post(&self.config.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ForumError::Parse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ForumError::Auth(error));
        }
        let value = body
            .access_token
            .ok_or_else(|| ForumError::Auth("token response without access_token".to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);

        *self.token.lock() = Some(AccessToken {
            value: value.clone(),
            expires_at,
        });

        info!("Obtained access token for {}", credentials.username);
        Ok(Some(value))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ForumError> {
        let url = format!("{}{}", self.config.api_base, path);
        let mut request = self.client.get(&url).query(query);

        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!("Rate limit remaining: {}", remaining);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            if matches!(err, ForumError::Auth(_)) && self.token.lock().take().is_some() {
                warn!("Access token rejected, requesting a new one on the next call");
            }
            return Err(err);
        }

        // Unknown subreddits redirect to the search page instead of a 404
        if response.url().path().starts_with("/subreddits/search")
            && !path.starts_with("/subreddits/search")
        {
            return Err(ForumError::NotFound(format!("{} redirected to search", path)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ForumError::Parse(e.to_string()))
    }

    /// Verify the source is reachable and the credentials work
    pub async fn check_connection(&self) -> Result<String, ForumError> {
        if self.config.is_authenticated() {
            let me: MeResponse = self.get_json("/api/v1/me", &[]).await?;
            Ok(format!("authenticated as {}", me.name))
        } else {
            let _: Listing<LinkData> = self
                .get_json("/r/all/top.json", &[("limit", "1".to_string())])
                .await?;
            Ok("anonymous access OK".to_string())
        }
    }
}

#[async_trait]
impl ForumSource for RedditSource {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn fetch_posts(
        &self,
        forum: &str,
        plan: ListingPlan,
        limit: usize,
    ) -> Result<Vec<Post>, ForumError> {
        let path = format!("/r/{}/{}.json", urlencoding::encode(forum), plan.mode.as_str());
        let mut posts: Vec<Post> = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let page_size = (limit - posts.len()).min(self.config.page_size.max(1));
            let mut query = vec![
                ("limit", page_size.to_string()),
                ("raw_json", "1".to_string()),
            ];
            if plan.mode.uses_time_window() {
                query.push(("t", plan.window.as_str().to_string()));
            }
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
                query.push(("count", posts.len().to_string()));
            }

            let listing: Listing<LinkData> = self.get_json(&path, &query).await?;
            let (batch, next) = listing.into_posts(forum);
            let fetched = batch.len();
            posts.extend(batch);

            debug!("r/{}: page of {} posts ({} total)", forum, fetched, posts.len());

            match next {
                Some(cursor) if fetched > 0 => after = Some(cursor),
                _ => break,
            }
        }

        posts.truncate(limit);
        Ok(posts)
    }

    async fn search_forums(&self, keyword: &str, limit: usize) -> Result<Vec<String>, ForumError> {
        let mut names: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut after: Option<String> = None;

        while names.len() < limit {
            let page_size = (limit - names.len()).min(self.config.page_size.max(1));
            let mut query = vec![
                ("q", keyword.to_string()),
                ("limit", page_size.to_string()),
            ];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let listing: Listing<SubredditData> =
                self.get_json("/subreddits/search.json", &query).await?;
            let (batch, next) = listing.into_names();
            let fetched = batch.len();

            for name in batch {
                if seen.insert(name.to_lowercase()) {
                    names.push(name);
                }
            }

            match next {
                Some(cursor) if fetched > 0 => after = Some(cursor),
                _ => break,
            }
        }

        names.truncate(limit);
        Ok(names)
    }

    fn profile_url(&self, handle: &str) -> String {
        format!("{}{}", self.profile_base, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, RedditCredentials};
    use scout_core::{RankingMode, TimeWindow};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn link(id: &str, author: &str, score: i64) -> serde_json::Value {
        json!({"kind": "t3", "data": {"id": id, "author": author, "score": score, "subreddit": "SaaS"}})
    }

    fn listing(children: Vec<serde_json::Value>, after: Option<&str>) -> serde_json::Value {
        json!({"kind": "Listing", "data": {"children": children, "after": after}})
    }

    fn top_year() -> ListingPlan {
        ListingPlan {
            mode: RankingMode::Top,
            window: TimeWindow::Year,
        }
    }

    fn anonymous(server: &MockServer) -> RedditSource {
        let mut config = RedditConfig::anonymous().with_api_base(&server.uri());
        config.page_size = 2;
        RedditSource::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_posts_follows_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/r/SaaS/top.json"))
            .and(query_param("t", "year"))
            .and(query_param_is_missing("after"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(
                vec![link("1", "alice", 10), link("2", "bob", 20)],
                Some("t3_2"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/r/SaaS/top.json"))
            .and(query_param("after", "t3_2"))
            .and(query_param("limit", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(listing(vec![link("3", "alice", 30)], Some("t3_3"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = anonymous(&server);
        let posts = source.fetch_posts("SaaS", top_year(), 3).await.unwrap();

        assert_eq!(posts.len(), 3);
        assert_eq!(posts[2].author, "alice");
        assert_eq!(posts[2].score, 30);
    }

    #[tokio::test]
    async fn test_fetch_posts_stops_on_last_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/r/tiny/top.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(listing(vec![link("1", "alice", 10)], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = anonymous(&server);
        let posts = source.fetch_posts("tiny", top_year(), 1000).await.unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_posts_private_forum() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/r/secret/top.json"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({"reason": "private", "message": "Forbidden", "error": 403}),
            ))
            .mount(&server)
            .await;

        let err = anonymous(&server)
            .fetch_posts("secret", top_year(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::Forbidden(_)));
        assert_eq!(err.kind(), FailureKind::Unavailable);
    }

    #[tokio::test]
    async fn test_fetch_posts_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/r/busy/top.json"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = anonymous(&server)
            .fetch_posts("busy", top_year(), 10)
            .await
            .unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_hot_listing_has_no_time_window() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/r/SaaS/hot.json"))
            .and(query_param_is_missing("t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![], None)))
            .expect(1)
            .mount(&server)
            .await;

        let plan = ListingPlan {
            mode: RankingMode::Hot,
            window: TimeWindow::All,
        };
        let posts = anonymous(&server).fetch_posts("SaaS", plan, 10).await.unwrap();
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_requests_use_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"access_token": "tok-1", "token_type": "bearer", "expires_in": 86400}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/r/SaaS/top.json"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(listing(vec![link("1", "alice", 10)], None)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let config = RedditConfig::script(RedditCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "scout".to_string(),
            password: "pw".to_string(),
        })
        .with_api_base(&server.uri())
        .with_token_url(&format!("{}/api/v1/access_token", server.uri()));
        let source = RedditSource::new(config).unwrap();

        // Second call reuses the cached token
        source.fetch_posts("SaaS", top_year(), 10).await.unwrap();
        source.fetch_posts("SaaS", top_year(), 10).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_token_is_requested_again() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"access_token": "tok-1", "token_type": "bearer", "expires_in": 86400}),
            ))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/r/revoked/top.json"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"message": "Unauthorized", "error": 401}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/r/SaaS/top.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(listing(vec![link("1", "alice", 10)], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = RedditConfig::script(RedditCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "scout".to_string(),
            password: "pw".to_string(),
        })
        .with_api_base(&server.uri())
        .with_token_url(&format!("{}/api/v1/access_token", server.uri()));
        let source = RedditSource::new(config).unwrap();

        let err = source
            .fetch_posts("revoked", top_year(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::Auth(_)));

        // The next forum fetches a fresh token instead of reusing the rejected one
        let posts = source.fetch_posts("SaaS", top_year(), 10).await.unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_not_rate_limit() {
        let config = RedditConfig::anonymous().with_api_base("http://127.0.0.1:1");
        let err = RedditSource::new(config)
            .unwrap()
            .fetch_posts("RateLimitFans", top_year(), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, ForumError::Request(_)));
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_token_error_is_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let config = RedditConfig::script(RedditCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "scout".to_string(),
            password: "wrong".to_string(),
        })
        .with_api_base(&server.uri())
        .with_token_url(&format!("{}/api/v1/access_token", server.uri()));

        let err = RedditSource::new(config)
            .unwrap()
            .fetch_posts("SaaS", top_year(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::Auth(ref e) if e == "invalid_grant"));
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_search_forums_dedupes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/subreddits/search.json"))
            .and(query_param("q", "Entrepreneur"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "Listing",
                "data": {"after": null, "children": [
                    {"kind": "t5", "data": {"display_name": "Entrepreneur"}},
                    {"kind": "t5", "data": {"display_name": "entrepreneur"}},
                    {"kind": "t5", "data": {"display_name": "EntrepreneurRideAlong"}}
                ]}
            })))
            .mount(&server)
            .await;

        let mut config = RedditConfig::anonymous().with_api_base(&server.uri());
        config.page_size = 100;
        let names = RedditSource::new(config)
            .unwrap()
            .search_forums("Entrepreneur", 100)
            .await
            .unwrap();

        assert_eq!(names, vec!["Entrepreneur", "EntrepreneurRideAlong"]);
    }

    #[test]
    fn test_profile_url() {
        let source = RedditSource::new(RedditConfig::anonymous()).unwrap();
        assert_eq!(source.profile_url("alice"), "https://reddit.com/user/alice");
    }
}
