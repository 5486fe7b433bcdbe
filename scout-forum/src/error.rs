//! Forum source errors and their failure categories

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors from the forum content source
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Forum not found or banned: {0}")]
    NotFound(String),

    #[error("Forum private or forbidden: {0}")]
    Forbidden(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("{0}")]
    Other(String),
}

/// How the fetcher treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with backoff, bounded
    RateLimited,
    /// Not found, banned, private or forbidden: skip without retry
    Unavailable,
    /// Network or anything else: skip and record
    Transient,
}

static RATE_LIMIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rate[\s_-]?limit").unwrap());

impl ForumError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ForumError::RateLimited(_) => FailureKind::RateLimited,
            ForumError::NotFound(_) | ForumError::Forbidden(_) => FailureKind::Unavailable,
            ForumError::Api { status: 429, .. } => FailureKind::RateLimited,
            // Some API failures only say so in their message. Request errors
            // carry the URL, so a forum name must not count as a signal.
            ForumError::Api { message, .. } | ForumError::Other(message)
                if RATE_LIMIT_REGEX.is_match(message) =>
            {
                FailureKind::RateLimited
            }
            _ => FailureKind::Transient,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind() == FailureKind::RateLimited
    }
}

/// Error body shape the API uses for 403/404 responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-success response to a [`ForumError`]
pub fn classify_status(status: StatusCode, body: &str) -> ForumError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = match (parsed.reason, parsed.message) {
        (Some(reason), Some(message)) => format!("{} ({})", reason, message),
        (Some(reason), None) => reason,
        (None, Some(message)) => message,
        (None, None) => status.to_string(),
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => ForumError::RateLimited(detail),
        StatusCode::NOT_FOUND => ForumError::NotFound(detail),
        StatusCode::FORBIDDEN => ForumError::Forbidden(detail),
        StatusCode::UNAUTHORIZED => ForumError::Auth(detail),
        _ => ForumError::Api {
            status: status.as_u16(),
            message: truncate(body, 200),
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
