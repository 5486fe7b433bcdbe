//! Notification channel abstraction

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from a notification channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Channel rejected message: {0}")]
    Rejected(String),

    #[error("Notifier not configured: {0}")]
    NotConfigured(String),
}

/// Delivers plain-text messages to a fixed destination
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs
    fn name(&self) -> &str;

    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Shared reference to a notifier
pub type SharedNotifier = Arc<dyn Notifier>;

/// Writes messages to the log instead of sending them (dry runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!("[dry-run] would notify:\n{}", text);
        Ok(())
    }
}

/// Keeps every message in memory; fails the sends whose text matches
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail_on: Vec<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any message containing `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if let Some(needle) = self.fail_on.iter().find(|n| text.contains(n.as_str())) {
            return Err(NotifyError::Rejected(format!("refused message about {}", needle)));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}
