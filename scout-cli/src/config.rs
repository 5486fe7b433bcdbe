//! `karmascout.toml` configuration
//!
//! Every section is optional and falls back to its defaults. Secrets given
//! on the command line or through the environment win over the file.

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use scout_core::{RankThresholds, RankingMode, TimeWindow, DEFAULT_MIN_KARMA, DEFAULT_MIN_POSTS};
use scout_forum::{RedditConfig, RedditCredentials, RetryPolicy, PROFILE_URL_BASE};
use scout_outreach::{OutreachTemplate, DEFAULT_OUTREACH_TEMPLATE, DEFAULT_REGISTRY_PATH};
use scout_runtime::{OverlapPolicy, PipelineConfig, DEFAULT_KEYWORD, DEFAULT_KEYWORD_LIMIT};

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "karmascout.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reddit: RedditSection,
    pub discovery: DiscoverySection,
    pub retry: RetrySection,
    pub pacing: PacingSection,
    pub registry: RegistrySection,
    pub telegram: TelegramSection,
    pub outreach: OutreachSection,
    pub schedule: ScheduleSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RedditSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub forums: Vec<String>,
    pub keyword: String,
    pub keyword_limit: usize,
    pub modes: Vec<RankingMode>,
    pub time_windows: Vec<TimeWindow>,
    pub post_limit: usize,
    pub min_posts: u64,
    pub min_karma: i64,
    pub excluded_authors: Vec<String>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            forums: Vec::new(),
            keyword: DEFAULT_KEYWORD.to_string(),
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            modes: pipeline.modes,
            time_windows: pipeline.windows,
            post_limit: pipeline.post_limit,
            min_posts: DEFAULT_MIN_POSTS,
            min_karma: DEFAULT_MIN_KARMA,
            excluded_authors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_step_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_step_secs: policy.backoff_step.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            min_ms: 2_000,
            max_ms: 7_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub path: PathBuf,
    pub overlap: OverlapPolicy,
    pub stale_after_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            overlap: OverlapPolicy::Skip,
            stale_after_secs: scout_runtime::DEFAULT_STALE_AFTER.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutreachSection {
    pub template: String,
    pub profile_url_base: String,
}

impl Default for OutreachSection {
    fn default() -> Self {
        Self {
            template: DEFAULT_OUTREACH_TEMPLATE.to_string(),
            profile_url_base: PROFILE_URL_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub interval_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            interval_secs: scout_runtime::DEFAULT_INTERVAL.as_secs(),
        }
    }
}

/// Secrets accepted from flags or the environment
#[derive(Debug, Clone, Default, Args)]
pub struct Secrets {
    /// Reddit script-app client id
    #[arg(long, env = "REDDIT_CLIENT_ID", hide_env_values = true, global = true)]
    pub reddit_client_id: Option<String>,

    /// Reddit script-app client secret
    #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub reddit_client_secret: Option<String>,

    /// Reddit account username
    #[arg(long, env = "REDDIT_USERNAME", global = true)]
    pub reddit_username: Option<String>,

    /// Reddit account password
    #[arg(long, env = "REDDIT_PASSWORD", hide_env_values = true, global = true)]
    pub reddit_password: Option<String>,

    /// User agent for Reddit requests
    #[arg(long, env = "REDDIT_USER_AGENT", global = true)]
    pub reddit_user_agent: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true, global = true)]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat id receiving notifications
    #[arg(long, env = "TELEGRAM_CHAT_ID", global = true)]
    pub telegram_chat_id: Option<String>,
}

fn override_with(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
        *target = Some(value.clone());
    }
}

impl Config {
    /// Load `path`; a missing file means defaults unless it was asked for
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() && !required {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_secrets(&mut self, secrets: &Secrets) {
        override_with(&mut self.reddit.client_id, &secrets.reddit_client_id);
        override_with(&mut self.reddit.client_secret, &secrets.reddit_client_secret);
        override_with(&mut self.reddit.username, &secrets.reddit_username);
        override_with(&mut self.reddit.password, &secrets.reddit_password);
        override_with(&mut self.reddit.user_agent, &secrets.reddit_user_agent);
        override_with(&mut self.telegram.bot_token, &secrets.telegram_bot_token);
        override_with(&mut self.telegram.chat_id, &secrets.telegram_chat_id);
    }

    /// Script-app mode when all four credentials are present, anonymous otherwise
    pub fn reddit_config(&self) -> RedditConfig {
        let r = &self.reddit;
        let base = match (&r.client_id, &r.client_secret, &r.username, &r.password) {
            (Some(client_id), Some(client_secret), Some(username), Some(password)) => {
                RedditConfig::script(RedditCredentials {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    username: username.clone(),
                    password: password.clone(),
                })
            }
            (None, None, None, None) => RedditConfig::anonymous(),
            _ => {
                warn!("Incomplete Reddit credentials, falling back to anonymous access");
                RedditConfig::anonymous()
            }
        };

        let base = base.with_timeout(r.timeout_secs);
        match &r.user_agent {
            Some(user_agent) => base.with_user_agent(user_agent),
            None => base,
        }
    }

    /// Bot token and chat id, when both are set
    pub fn telegram_target(&self) -> Option<(String, String)> {
        match (&self.telegram.bot_token, &self.telegram.chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.clone(), chat.clone()))
            }
            _ => None,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let d = &self.discovery;
        PipelineConfig {
            forums: d.forums.clone(),
            keyword: d.keyword.clone(),
            keyword_limit: d.keyword_limit,
            modes: d.modes.clone(),
            windows: d.time_windows.clone(),
            post_limit: d.post_limit,
            thresholds: RankThresholds {
                min_posts: d.min_posts,
                min_karma: d.min_karma,
            },
            excluded_authors: d.excluded_authors.clone(),
            retry: RetryPolicy::new(
                self.retry.max_attempts,
                Duration::from_secs(self.retry.backoff_step_secs),
            ),
        }
    }

    pub fn outreach_template(&self) -> OutreachTemplate {
        OutreachTemplate::new(&self.outreach.template)
    }
}
