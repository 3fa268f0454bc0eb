//! Notification consumer.
//!
//! Deliveries are acknowledged before the store update. If `mark_notified`
//! fails after the ack, the event stays pending and the next scan that covers
//! its notification time publishes it again.

use calnotify_core::error::Result;
use calnotify_core::traits::{Delivery, EventStore, MessageQueue};
use calnotify_core::types::Notification;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

#[derive(Debug, Default)]
pub struct SenderMetrics {
    pub received: AtomicU64,
    pub decode_errors: AtomicU64,
    pub acked: AtomicU64,
    pub ack_errors: AtomicU64,
    pub marked: AtomicU64,
    pub mark_errors: AtomicU64,
}

impl SenderMetrics {
    pub fn snapshot(&self) -> SenderSnapshot {
        SenderSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            ack_errors: self.ack_errors.load(Ordering::Relaxed),
            marked: self.marked.load(Ordering::Relaxed),
            mark_errors: self.mark_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderSnapshot {
    pub received: u64,
    pub decode_errors: u64,
    pub acked: u64,
    pub ack_errors: u64,
    pub marked: u64,
    pub mark_errors: u64,
}

pub struct Sender {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn MessageQueue>,
    metrics: Arc<SenderMetrics>,
}

impl Sender {
    pub fn new(store: Arc<dyn EventStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            store,
            queue,
            metrics: Arc::new(SenderMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<SenderMetrics> {
        self.metrics.clone()
    }

    /// Consume until `shutdown` flips to true or the delivery stream ends.
    ///
    /// Only a failure to start consuming is returned; per-delivery errors are
    /// logged and counted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut deliveries = self.queue.consume().await?;
        tracing::info!(queue = self.queue.name(), store = self.store.name(), "Sender started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = deliveries.next() => match next {
                    Some(delivery) => {
                        if let Err(e) = self.handle(delivery).await {
                            tracing::debug!(error = %e, "Delivery not completed, consuming next");
                        }
                    }
                    None => {
                        tracing::info!("Delivery stream closed");
                        break;
                    }
                },
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            received = snapshot.received,
            marked = snapshot.marked,
            decode_errors = snapshot.decode_errors,
            mark_errors = snapshot.mark_errors,
            "Sender stopped"
        );
        Ok(())
    }

    /// Decode, log, ack, then mark the event as notified.
    ///
    /// A body that does not decode is acked and dropped so it cannot block
    /// the queue. An ack failure is logged and the event is still marked.
    pub async fn handle(&self, mut delivery: Delivery) -> Result<Notification> {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tag = delivery.tag(), redelivered = delivery.redelivered(), "Received notification");

        let notification: Notification = match delivery.decode() {
            Ok(n) => n,
            Err(e) => {
                self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(tag = delivery.tag(), error = %e, "Dropping undecodable notification");
                self.ack(&mut delivery);
                return Err(e);
            }
        };
        tracing::info!("{notification}");

        self.ack(&mut delivery);

        match self.store.mark_notified(notification.event_id).await {
            Ok(()) => {
                self.metrics.marked.fetch_add(1, Ordering::Relaxed);
                Ok(notification)
            }
            Err(e) => {
                self.metrics.mark_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(event_id = %notification.event_id, error = %e, "Failed to mark event notified");
                Err(e)
            }
        }
    }

    fn ack(&self, delivery: &mut Delivery) {
        match delivery.ack() {
            Ok(()) => {
                self.metrics.acked.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.ack_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(tag = delivery.tag(), error = %e, "Ack failed");
            }
        }
    }

    /// Close the queue connection, which also ends a running consumer.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Sender is shutting down");
        self.queue.close().await
    }
}
