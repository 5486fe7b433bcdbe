//! Listing modes and time windows
//!
//! A run samples every forum with the same ranking mode and time window,
//! chosen at random from the configured lists when the run starts.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a forum listing is ranked upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    #[default]
    Top,
    Hot,
    New,
    Rising,
}

/// Time window for `top` listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseListingError {
    kind: &'static str,
    value: String,
}

impl RankingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMode::Top => "top",
            RankingMode::Hot => "hot",
            RankingMode::New => "new",
            RankingMode::Rising => "rising",
        }
    }

    /// Whether the upstream listing honors a time window
    pub fn uses_time_window(&self) -> bool {
        matches!(self, RankingMode::Top)
    }
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingMode {
    type Err = ParseListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(RankingMode::Top),
            "hot" => Ok(RankingMode::Hot),
            "new" => Ok(RankingMode::New),
            "rising" => Ok(RankingMode::Rising),
            _ => Err(ParseListingError {
                kind: "ranking mode",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = ParseListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(TimeWindow::Hour),
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "year" => Ok(TimeWindow::Year),
            "all" => Ok(TimeWindow::All),
            _ => Err(ParseListingError {
                kind: "time window",
                value: s.to_string(),
            }),
        }
    }
}

/// Ranking mode and time window used for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingPlan {
    pub mode: RankingMode,
    pub window: TimeWindow,
}

impl ListingPlan {
    /// Pick uniformly from the allowed modes and windows.
    ///
    /// Empty lists fall back to the defaults (`top`, `all`).
    pub fn pick<R: Rng + ?Sized>(
        modes: &[RankingMode],
        windows: &[TimeWindow],
        rng: &mut R,
    ) -> Self {
        Self {
            mode: modes.choose(rng).copied().unwrap_or_default(),
            window: windows.choose(rng).copied().unwrap_or_default(),
        }
    }

    pub fn random(modes: &[RankingMode], windows: &[TimeWindow]) -> Self {
        Self::pick(modes, windows, &mut rand::thread_rng())
    }
}

impl fmt::Display for ListingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode.uses_time_window() {
            write!(f, "{} ({})", self.mode, self.window)
        } else {
            write!(f, "{}", self.mode)
        }
    }
}
