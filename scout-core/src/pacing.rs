//! Pacing strategies
//!
//! The pipeline waits between forums and between notifications to stay
//! under the upstream's global rate limit. The delay source is injectable so
//! tests can run with [`NoPacing`].

use rand::Rng;
use std::time::Duration;

/// Source of the next pacing delay
pub trait Pacing: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Uniformly random delay within `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomPacing {
    min: Duration,
    max: Duration,
}

impl RandomPacing {
    /// Bounds are swapped if given in the wrong order
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }
}

impl Default for RandomPacing {
    fn default() -> Self {
        Self::from_millis(2_000, 7_000)
    }
}

impl Pacing for RandomPacing {
    fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        let ms = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(ms)
    }
}

/// Constant delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPacing(pub Duration);

impl Pacing for FixedPacing {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

/// No delay at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacing for NoPacing {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}
