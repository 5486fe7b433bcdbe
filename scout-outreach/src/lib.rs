//! karmascout outreach layer
//!
//! Everything downstream of ranking:
//! - The persisted account registry and the merge of a run's candidates
//! - Notification channels (Telegram, log)
//! - Outreach and summary message rendering
//! - Diffing candidates against the pre-run snapshot and dispatching

pub mod diff;
pub mod message;
pub mod notifier;
pub mod registry;
pub mod telegram;

pub use diff::*;
pub use message::*;
pub use notifier::*;
pub use registry::*;
pub use telegram::*;
