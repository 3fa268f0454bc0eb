//! Event store trait shared by every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Event, Granularity};

/// Owns event records. Callers always receive copies.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Acquire backend resources. Not retried internally.
    async fn connect(&self) -> Result<()>;

    /// Release backend resources.
    async fn close(&self) -> Result<()>;

    /// Insert a new event. Fails with `DateAlreadyBusy` when its `[start, end)`
    /// overlaps a stored event.
    async fn create(&self, event: Event) -> Result<()>;

    /// Remove an event. Fails with `EventNotFound` if absent.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Replace the stored record wholesale, keeping `id`.
    /// Fails with `EventNotFound` if absent.
    async fn edit(&self, id: Uuid, event: Event) -> Result<()>;

    async fn exists(&self, id: Uuid) -> Result<bool>;

    async fn get_event(&self, id: Uuid) -> Result<Event>;

    /// Events starting in `[date, date + granularity)`, ordered by start.
    async fn list(&self, date: DateTime<Utc>, granularity: Granularity) -> Result<Vec<Event>>;

    /// Pending events whose notification time lies in `[from, to]`.
    async fn get_due(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Set the notified flag. Absent ids are ignored.
    async fn mark_notified(&self, id: Uuid) -> Result<()>;

    /// Apply the retention rule relative to `now`, returning how many events
    /// were purged.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
