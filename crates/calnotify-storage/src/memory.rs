//! In-memory event store. One reader/writer lock guards the whole map.

use async_trait::async_trait;
use calnotify_core::error::{CalNotifyError, Result};
use calnotify_core::traits::EventStore;
use calnotify_core::types::{Event, Granularity, Retention};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

pub struct MemoryStore {
    events: RwLock<HashMap<Uuid, Event>>,
    retention: Retention,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retention(Retention::default())
    }

    pub fn with_retention(retention: Retention) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, Event>>> {
        self.events.read().map_err(|e| CalNotifyError::storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, Event>>> {
        self.events.write().map_err(|e| CalNotifyError::storage(e.to_string()))
    }

    fn select(&self, keep: impl Fn(&Event) -> bool) -> Result<Vec<Event>> {
        let events = self.read()?;
        let mut selected: Vec<Event> = events.values().filter(|e| keep(e)).cloned().collect();
        selected.sort_by_key(|e| e.start_date);
        Ok(selected)
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str { "memory" }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn create(&self, event: Event) -> Result<()> {
        let mut events = self.write()?;
        if events.values().any(|existing| existing.overlaps(&event)) {
            return Err(CalNotifyError::DateAlreadyBusy);
        }
        if events.contains_key(&event.id) {
            return Err(CalNotifyError::EventAlreadyExists(event.id));
        }
        tracing::debug!(event_id = %event.id, user_id = event.user_id, "Event created");
        events.insert(event.id, event);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut events = self.write()?;
        events.remove(&id).ok_or(CalNotifyError::EventNotFound(id))?;
        Ok(())
    }

    async fn edit(&self, id: Uuid, mut event: Event) -> Result<()> {
        let mut events = self.write()?;
        let slot = events.get_mut(&id).ok_or(CalNotifyError::EventNotFound(id))?;
        event.id = id;
        *slot = event;
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.read()?.contains_key(&id))
    }

    async fn get_event(&self, id: Uuid) -> Result<Event> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or(CalNotifyError::EventNotFound(id))
    }

    async fn list(&self, date: DateTime<Utc>, granularity: Granularity) -> Result<Vec<Event>> {
        let until = granularity.window_end(date);
        self.select(|e| e.start_date >= date && e.start_date < until)
    }

    async fn get_due(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        self.select(|e| e.is_due(from, to))
    }

    async fn mark_notified(&self, id: Uuid) -> Result<()> {
        if let Some(event) = self.write()?.get_mut(&id) {
            event.is_notified = true;
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let threshold = self.retention.threshold(now);
        let mut events = self.write()?;
        let before = events.len();
        events.retain(|_, e| !self.retention.should_purge(e, threshold));
        Ok(before - events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calnotify_core::types::RetentionPolicy;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn event(day: u32, from: u32, to: u32) -> Event {
        Event::new(1, format!("event {day}/{from}"), at(day, from), at(day, to))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let e = event(2, 9, 10).with_description("planning");
        store.create(e.clone()).await.unwrap();

        assert!(store.exists(e.id).await.unwrap());
        assert_eq!(store.get_event(e.id).await.unwrap(), e);
    }

    #[tokio::test]
    async fn test_overlap_rejected_in_either_order() {
        let outer = event(2, 9, 12);
        let inner = event(2, 10, 11);

        let store = MemoryStore::new();
        store.create(outer.clone()).await.unwrap();
        let err = store.create(inner.clone()).await.unwrap_err();
        assert!(matches!(err, CalNotifyError::DateAlreadyBusy));
        assert_eq!(store.len(), 1);

        let store = MemoryStore::new();
        store.create(inner).await.unwrap();
        let err = store.create(outer).await.unwrap_err();
        assert!(matches!(err, CalNotifyError::DateAlreadyBusy));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_start_is_busy() {
        let store = MemoryStore::new();
        store.create(event(2, 9, 10)).await.unwrap();
        assert!(matches!(
            store.create(event(2, 9, 11)).await,
            Err(CalNotifyError::DateAlreadyBusy)
        ));
    }

    #[tokio::test]
    async fn test_back_to_back_events_allowed() {
        let store = MemoryStore::new();
        store.create(event(2, 9, 10)).await.unwrap();
        store.create(event(2, 10, 11)).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryStore::new();
        let e = event(2, 9, 10);
        store.create(e.clone()).await.unwrap();

        let mut copy = event(4, 9, 10);
        copy.id = e.id;
        assert!(matches!(store.create(copy).await, Err(CalNotifyError::EventAlreadyExists(id)) if id == e.id));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let e = event(2, 9, 10);
        store.create(e.clone()).await.unwrap();
        store.delete(e.id).await.unwrap();
        assert!(!store.exists(e.id).await.unwrap());
        assert!(matches!(store.delete(e.id).await, Err(CalNotifyError::EventNotFound(id)) if id == e.id));
    }

    #[tokio::test]
    async fn test_edit_replaces_and_keeps_id() {
        let store = MemoryStore::new();
        let e = event(2, 9, 10);
        store.create(e.clone()).await.unwrap();

        let replacement = event(3, 14, 15).with_description("moved");
        store.edit(e.id, replacement.clone()).await.unwrap();

        let stored = store.get_event(e.id).await.unwrap();
        assert_eq!(stored.id, e.id);
        assert_eq!(stored.start_date, replacement.start_date);
        assert_eq!(stored.description, "moved");
        assert!(!store.exists(replacement.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_edit_missing() {
        let store = MemoryStore::new();
        let e = event(2, 9, 10);
        assert!(matches!(store.edit(e.id, e).await, Err(CalNotifyError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_event(Uuid::new_v4()).await,
            Err(CalNotifyError::EventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_windows() {
        let store = MemoryStore::new();
        let first = event(2, 0, 1);
        let same_day = event(2, 15, 16);
        let next_week = event(8, 9, 10);
        let next_month = event(30, 9, 10);
        let outside = Event::new(1, "april", at(2, 9) + Duration::days(31), at(2, 10) + Duration::days(31));
        for e in [&first, &same_day, &next_week, &next_month, &outside] {
            store.create(e.clone()).await.unwrap();
        }

        let anchor = at(2, 0);
        let day = store.list(anchor, Granularity::Day).await.unwrap();
        assert_eq!(day.iter().map(|e| e.id).collect::<Vec<_>>(), vec![first.id, same_day.id]);

        let week = store.list(anchor, Granularity::Week).await.unwrap();
        assert_eq!(week.len(), 3);

        let month = store.list(anchor, Granularity::Month).await.unwrap();
        assert_eq!(month.len(), 4);
        assert!(!month.iter().any(|e| e.id == outside.id));

        let fallback = store.list(anchor, Granularity::from("year")).await.unwrap();
        assert_eq!(fallback, day);
    }

    #[tokio::test]
    async fn test_due_and_mark_notified() {
        let store = MemoryStore::new();
        let e = event(2, 9, 10).with_notification_date(at(2, 8));
        store.create(e.clone()).await.unwrap();

        let due = store.get_due(at(2, 7), at(2, 8)).await.unwrap();
        assert_eq!(due.len(), 1);

        store.mark_notified(e.id).await.unwrap();
        store.mark_notified(e.id).await.unwrap();
        assert!(store.get_event(e.id).await.unwrap().is_notified);
        assert!(store.get_due(at(2, 7), at(2, 8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_notified_missing_is_noop() {
        let store = MemoryStore::new();
        store.mark_notified(Uuid::new_v4()).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_expired_policies() {
        let now = at(20, 12);
        let old = Event::new(1, "old", now - Duration::days(800), now - Duration::days(799));
        let recent = Event::new(1, "recent", now - Duration::days(3), now - Duration::days(2));

        let store = MemoryStore::new();
        store.create(old.clone()).await.unwrap();
        store.create(recent.clone()).await.unwrap();
        assert_eq!(store.delete_expired(now).await.unwrap(), 1);
        assert!(!store.exists(old.id).await.unwrap());
        assert!(store.exists(recent.id).await.unwrap());

        let legacy = MemoryStore::with_retention(Retention::new(RetentionPolicy::EndedAfter, 12));
        legacy.create(old.clone()).await.unwrap();
        legacy.create(recent.clone()).await.unwrap();
        assert_eq!(legacy.delete_expired(now).await.unwrap(), 1);
        assert!(legacy.exists(old.id).await.unwrap());
        assert!(!legacy.exists(recent.id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_creates() {
        let store = Arc::new(MemoryStore::new());
        let base = at(1, 0);
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let start = base + Duration::hours(i);
                    store.create(Event::new(i, "slot", start, start + Duration::hours(1))).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len(), 64);
    }
}
