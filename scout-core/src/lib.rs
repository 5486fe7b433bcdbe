//! karmascout core - account model and per-run activity ranking
//!
//! This crate provides the foundational primitives:
//! - Posts, candidates and persisted account records
//! - Per-run activity accumulation across forums
//! - Threshold filtering and karma ranking
//! - Listing modes and time windows
//! - Pacing strategies for upstream-friendly scheduling

pub mod account;
pub mod activity;
pub mod listing;
pub mod pacing;
pub mod rank;

pub use account::*;
pub use activity::*;
pub use listing::*;
pub use pacing::*;
pub use rank::*;

/// Author name the upstream API reports for deleted accounts
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Automated moderator account present in most forums
pub const AUTOMODERATOR: &str = "AutoModerator";

/// Default minimum sampled posts for an account to become a candidate
pub const DEFAULT_MIN_POSTS: u64 = 5;

/// Default minimum karma sum for an account to become a candidate
pub const DEFAULT_MIN_KARMA: i64 = 500;

/// Default upper bound on posts sampled per forum
pub const DEFAULT_POST_LIMIT: usize = 1000;
