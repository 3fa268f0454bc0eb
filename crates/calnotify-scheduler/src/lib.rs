//! # calnotify scheduler
//!
//! Periodic scan over the event store. Each tick:
//!
//! ```text
//! tick ──► get_due([now - interval + 1s, now]) ──► publish Notification × N
//!      └─► delete_expired(now)
//! ```
//!
//! Scans are spawned and never awaited by the loop, so a slow store does not
//! delay the next tick. Duplicates from overlapping scans are bounded by the
//! `is_notified` filter and the idempotent `mark_notified`.

pub mod engine;
pub mod metrics;

pub use engine::{ScanReport, Scheduler};
pub use metrics::{SchedulerMetrics, SchedulerSnapshot};
