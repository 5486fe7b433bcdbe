//! karmascout runtime
//!
//! Wires the stages into one idempotent run:
//! - Run lease (in-process single flight plus a lock file next to the registry)
//! - Forum resolution, fetch, aggregate, rank, merge, notify
//! - Fixed-interval scheduler around `run_once`

pub mod lease;
pub mod pipeline;
pub mod scheduler;

pub use lease::*;
pub use pipeline::*;
pub use scheduler::*;
