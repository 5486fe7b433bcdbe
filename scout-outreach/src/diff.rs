//! New-account detection and notification dispatch
//!
//! Accounts are "new" when their handle is absent from the registry snapshot
//! read at the start of the run. Each new account gets one outreach message,
//! then one summary goes out for the whole run.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use scout_core::{AccountRecord, Candidate, Pacing};

use crate::{summary_message, OutreachTemplate, SharedNotifier};

/// Handles present in the registry before the run
pub fn snapshot_handles(snapshot: &[AccountRecord]) -> HashSet<String> {
    snapshot.iter().map(|r| r.handle.clone()).collect()
}

/// Candidates whose handle is not in `known`, in ranked order
pub fn new_handles<'a>(known: &HashSet<String>, candidates: &'a [Candidate]) -> Vec<&'a Candidate> {
    candidates
        .iter()
        .filter(|c| !known.contains(&c.handle))
        .collect()
}

/// What dispatching produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub new_accounts: usize,
    pub sent: usize,
    pub failed: usize,
    pub summary_sent: bool,
}

/// Sends outreach for new accounts plus a run summary
pub struct DiffNotifier {
    notifier: SharedNotifier,
    template: OutreachTemplate,
    pacing: Arc<dyn Pacing>,
}

impl DiffNotifier {
    pub fn new(notifier: SharedNotifier, pacing: Arc<dyn Pacing>) -> Self {
        Self {
            notifier,
            template: OutreachTemplate::default(),
            pacing,
        }
    }

    pub fn with_template(mut self, template: OutreachTemplate) -> Self {
        self.template = template;
        self
    }

    /// Notify about every candidate missing from `known`.
    ///
    /// Failures are logged and counted; they never stop later messages.
    pub async fn dispatch<F>(
        &self,
        known: &HashSet<String>,
        candidates: &[Candidate],
        location: &str,
        profile_url: F,
    ) -> NotifyReport
    where
        F: Fn(&str) -> String,
    {
        let fresh = new_handles(known, candidates);
        let mut report = NotifyReport {
            new_accounts: fresh.len(),
            ..Default::default()
        };

        if fresh.is_empty() {
            info!("No new users found in this run");
            return report;
        }

        info!(
            "Found {} new users out of {} total users",
            fresh.len(),
            candidates.len()
        );

        for candidate in &fresh {
            let text = self
                .template
                .render(candidate, &profile_url(&candidate.handle));

            match self.notifier.send(&text).await {
                Ok(()) => {
                    report.sent += 1;
                    info!(
                        "Sent {} notification for new user {}",
                        self.notifier.name(),
                        candidate.handle
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Error notifying about {}: {}", candidate.handle, e);
                }
            }

            let delay = self.pacing.next_delay();
            debug!("Pacing {}ms before next notification", delay.as_millis());
            tokio::time::sleep(delay).await;
        }

        let summary = summary_message(fresh.len(), candidates.len(), location);
        match self.notifier.send(&summary).await {
            Ok(()) => {
                report.summary_sent = true;
                info!("Sent summary notification");
            }
            Err(e) => error!("Error sending summary notification: {}", e),
        }

        report
    }
}
