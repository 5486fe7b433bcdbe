//! HTTP client and Reddit connection settings
//!
//! Script-app credentials switch the source to the OAuth API host; without
//! them the public JSON endpoints are used.

use reqwest::Client;
use std::time::Duration;

use crate::ForumError;

/// Public JSON API host
pub const PUBLIC_API_BASE: &str = "https://www.reddit.com";

/// OAuth API host used once a token has been obtained
pub const OAUTH_API_BASE: &str = "https://oauth.reddit.com";

/// Password-grant token endpoint
pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Profile page prefix for a handle
pub const PROFILE_URL_BASE: &str = "https://reddit.com/user/";

/// Maximum items the listing endpoints return per page
pub const MAX_PAGE_SIZE: usize = 100;

const DEFAULT_USER_AGENT: &str = concat!("karmascout/", env!("CARGO_PKG_VERSION"));

/// Script-app credentials for the password grant
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

/// Reddit connection configuration
#[derive(Debug, Clone)]
pub struct RedditConfig {
    /// `None` runs anonymously against the public endpoints
    pub credentials: Option<RedditCredentials>,
    /// User agent sent with every request
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// API host for listings and search
    pub api_base: String,
    /// Token endpoint
    pub token_url: String,
    /// Items requested per listing page
    pub page_size: usize,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            api_base: PUBLIC_API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl RedditConfig {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn script(credentials: RedditCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            api_base: OAUTH_API_BASE.to_string(),
            ..Default::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        if !user_agent.trim().is_empty() {
            self.user_agent = user_agent.to_string();
        }
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Create the HTTP client used for every request to the source
pub fn create_http_client(config: &RedditConfig) -> Result<Client, ForumError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ForumError::ClientBuild(e.to_string()))
}
