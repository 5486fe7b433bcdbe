//! Outreach and summary message rendering
//!
//! Templates use `{name}` placeholders:
//! - `{handle}`: the account handle
//! - `{forums}`: comma-separated forums the account posted in this run
//! - `{forum_noun}`: singular or plural noun matching the forum count
//! - `{activity}`: one `forum: N posts` line per forum
//! - `{profile_url}`: public profile link
//!
//! Unknown placeholders are left untouched.

use scout_core::Candidate;

/// Default outreach message for a newly discovered account
pub const DEFAULT_OUTREACH_TEMPLATE: &str = "Hi {handle}.\n\n\
I see that you post a lot in {forums} {forum_noun}. \
Ever wish that you schedule content and cross-post content on the best time ?\n\n\
I developed a tool that allows you to schedule content and cross-post content on the best time.\n\n\
Would you be interested in trying it out ?\n\n\
{profile_url}";

/// Renders the per-account outreach message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutreachTemplate {
    template: String,
    singular: String,
    plural: String,
}

impl Default for OutreachTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_OUTREACH_TEMPLATE)
    }
}

impl OutreachTemplate {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            singular: "subreddit".to_string(),
            plural: "subreddits".to_string(),
        }
    }

    /// Nouns substituted for `{forum_noun}`
    pub fn with_nouns(mut self, singular: &str, plural: &str) -> Self {
        self.singular = singular.to_string();
        self.plural = plural.to_string();
        self
    }

    /// Fill the template for one candidate.
    ///
    /// The profile link is appended when the template has no slot for it.
    pub fn render(&self, candidate: &Candidate, profile_url: &str) -> String {
        let forums: Vec<&str> = candidate.forums.iter().map(String::as_str).collect();
        let noun = if forums.len() == 1 {
            &self.singular
        } else {
            &self.plural
        };

        let mut text = self
            .template
            .replace("{handle}", &candidate.handle)
            .replace("{forums}", &forums.join(", "))
            .replace("{forum_noun}", noun)
            .replace("{activity}", &candidate.activity_lines().join("\n"));

        if text.contains("{profile_url}") {
            text = text.replace("{profile_url}", profile_url);
        } else {
            text.push_str("\n\n");
            text.push_str(profile_url);
        }

        text
    }
}

/// End-of-run summary sent when at least one new account was found
pub fn summary_message(new_count: usize, total_count: usize, location: &str) -> String {
    format!(
        "New Users Summary\n\n\
         Found {} new active users out of {} total users.\n\
         All new users have been sent as individual messages.\n\
         Full report saved to {}",
        new_count, total_count, location
    )
}
