//! Scheduler tick loop and due scan.

use calnotify_core::config::SchedulerConfig;
use calnotify_core::error::Result;
use calnotify_core::traits::{EventStore, MessageQueue};
use calnotify_core::types::Notification;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::metrics::SchedulerMetrics;

/// Outcome of a single scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
    pub purged: usize,
}

pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn EventStore>,
    queue: Arc<dyn MessageQueue>,
    metrics: Arc<SchedulerMetrics>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn EventStore>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            metrics: Arc::new(SchedulerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    /// Inclusive window scanned at `now`: the whole seconds
    /// `[now - interval + 1s, now]`.
    ///
    /// `now` is truncated to its second and the window ends at the last
    /// instant of that second, so ticks one interval apart cover adjacent
    /// windows with no gap, whatever the sub-second phase of the ticker.
    pub fn due_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let second = now.trunc_subsecs(0);
        let span = TimeDelta::from_std(self.config.interval()).unwrap_or(TimeDelta::MAX)
            - TimeDelta::seconds(1);
        let from = second.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let to = second
            .checked_add_signed(TimeDelta::seconds(1) - TimeDelta::nanoseconds(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (from, to)
    }

    /// Run one scan: publish every due event, then purge expired ones.
    ///
    /// Failures are logged and counted; they never abort the batch.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> ScanReport {
        self.metrics.scans.fetch_add(1, Ordering::Relaxed);
        let mut report = ScanReport::default();
        let (from, to) = self.due_window(now);

        match self.store.get_due(from, to).await {
            Ok(events) => {
                report.due = events.len();
                for event in &events {
                    let notification = Notification::from(event);
                    match self.queue.publish(&notification).await {
                        Ok(()) => {
                            report.published += 1;
                            self.metrics.published.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(event_id = %event.id, user_id = event.user_id, "Notification published");
                        }
                        Err(e) => {
                            report.failed += 1;
                            self.metrics.publish_errors.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(event_id = %event.id, error = %e, "Failed to publish notification");
                        }
                    }
                }
            }
            Err(e) => {
                self.metrics.scan_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%from, %to, error = %e, "Failed to query due events");
            }
        }

        match self.store.delete_expired(now).await {
            Ok(purged) => {
                report.purged = purged;
                self.metrics.purged.fetch_add(purged as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.purge_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Failed to delete expired events");
            }
        }

        if report.due > 0 || report.purged > 0 {
            tracing::info!(
                due = report.due,
                published = report.published,
                failed = report.failed,
                purged = report.purged,
                "Scan completed"
            );
        } else {
            tracing::trace!("Scan completed with nothing due");
        }
        report
    }

    /// Tick until `shutdown` flips to true or its sender is dropped.
    ///
    /// The first scan starts immediately. In-flight scans are not awaited on
    /// the way out.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Arc<SchedulerMetrics> {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.config.interval().as_secs(),
            store = self.store.name(),
            queue = self.queue.name(),
            "Scheduler started"
        );

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let this = self.clone();
                        tokio::spawn(async move {
                            this.scan_once(Utc::now()).await;
                        });
                    }
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            scans = snapshot.scans,
            published = snapshot.published,
            publish_errors = snapshot.publish_errors,
            purged = snapshot.purged,
            "Scheduler stopped"
        );
        self.metrics.clone()
    }

    /// Close the queue connection. Safe whether or not `run` was started.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Scheduler is shutting down");
        self.queue.close().await
    }
}
