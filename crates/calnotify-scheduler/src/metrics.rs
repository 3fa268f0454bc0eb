//! Scheduler counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for one scheduler.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Scans started
    pub scans: AtomicU64,
    /// Due-event queries that failed
    pub scan_errors: AtomicU64,
    /// Notifications published
    pub published: AtomicU64,
    pub publish_errors: AtomicU64,
    /// Events removed by the retention purge
    pub purged: AtomicU64,
    pub purge_errors: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            purge_errors: self.purge_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub scans: u64,
    pub scan_errors: u64,
    pub published: u64,
    pub publish_errors: u64,
    pub purged: u64,
    pub purge_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let metrics = SchedulerMetrics::new();
        metrics.scans.fetch_add(2, Ordering::Relaxed);
        metrics.published.fetch_add(5, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.scans, 2);
        assert_eq!(snap.published, 5);
        assert_eq!(snap.purge_errors, 0);
    }
}
