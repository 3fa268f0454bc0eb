//! Calendar event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled item with a time window and a notification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub notification_date: DateTime<Utc>,
    #[serde(default)]
    pub is_notified: bool,
}

impl Event {
    /// New pending event with a fresh id. The notification time defaults to
    /// the start of the event.
    pub fn new(
        user_id: i64,
        title: impl Into<String>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            description: String::new(),
            start_date,
            end_date,
            notification_date: start_date,
            is_notified: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_notification_date(mut self, at: DateTime<Utc>) -> Self {
        self.notification_date = at;
        self
    }

    /// Half-open `[start, end)` overlap, symmetric in both events.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start_date < other.end_date && other.start_date < self.end_date
    }

    /// Whether the notification is pending and its time lies in `[from, to]`.
    pub fn is_due(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        !self.is_notified && self.notification_date >= from && self.notification_date <= to
    }
}
