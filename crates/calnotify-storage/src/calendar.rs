//! Calendar facade: the operations a presentation layer calls.
//!
//! Transport layers pass already validated events and ids, and map
//! `CalNotifyError::is_client_error` to their own client/server codes.

use calnotify_core::error::Result;
use calnotify_core::traits::EventStore;
use calnotify_core::types::{Event, Granularity};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct Calendar {
    store: Arc<dyn EventStore>,
}

impl Calendar {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub async fn create_event(&self, event: Event) -> Result<Uuid> {
        let id = event.id;
        self.store.create(event).await.inspect_err(|e| {
            tracing::info!(event_id = %id, "Create rejected: {e}");
        })?;
        Ok(id)
    }

    pub async fn edit_event(&self, id: Uuid, event: Event) -> Result<()> {
        self.store.edit(id, event).await
    }

    pub async fn delete_event(&self, id: Uuid) -> Result<()> {
        self.store.delete(id).await
    }

    pub async fn event_exists(&self, id: Uuid) -> Result<bool> {
        self.store.exists(id).await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Event> {
        self.store.get_event(id).await
    }

    pub async fn list(&self, date: DateTime<Utc>, granularity: Granularity) -> Result<Vec<Event>> {
        self.store.list(date, granularity).await.inspect_err(|e| {
            tracing::error!(%date, %granularity, "List failed: {e}");
        })
    }

    /// `list` with a raw selector (`day`, `week`, `month`; anything else is a day).
    pub async fn list_by(&self, date: DateTime<Utc>, granularity: &str) -> Result<Vec<Event>> {
        self.list(date, Granularity::from(granularity)).await
    }
}
