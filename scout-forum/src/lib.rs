//! karmascout forum layer
//!
//! Provides access to the forum content source:
//! - HTTP client construction and Reddit credentials
//! - Listing and forum search over the Reddit JSON API
//! - Failure classification (rate limit, unavailable, other)
//! - Rate-limited fetching with linear backoff and forum pacing

pub mod client;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod reddit;
pub mod source;

pub use client::*;
pub use error::*;
pub use fetcher::*;
pub use listing::*;
pub use reddit::*;
pub use source::*;
