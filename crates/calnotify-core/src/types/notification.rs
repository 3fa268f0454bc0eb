//! Notification payload published for a due event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Event;

/// Transient message describing a due event. Field names are part of the
/// queue wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "eventTitle")]
    pub event_title: String,
    #[serde(rename = "datetime")]
    pub datetime: DateTime<Utc>,
    #[serde(rename = "userId")]
    pub user_id: i64,
}

impl From<&Event> for Notification {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            event_title: event.title.clone(),
            datetime: event.notification_date,
            user_id: event.user_id,
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "New notification from event {}, {} to user with ID {} {}",
            self.event_id,
            self.event_title,
            self.user_id,
            self.datetime.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Notification {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 30, 0).unwrap();
        let event = Event::new(42, "Board meeting", start, start + chrono::Duration::hours(1));
        Notification::from(&event)
    }

    #[test]
    fn test_wire_field_names() {
        let n = sample();
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["eventId"], n.event_id.to_string());
        assert_eq!(json["eventTitle"], "Board meeting");
        assert_eq!(json["userId"], 42);
        assert!(json["datetime"].as_str().unwrap().starts_with("2026-05-01T09:30:00"));
    }

    #[test]
    fn test_decode_external_payload() {
        let payload = r#"{"eventId":"6f1c1a3e-8d3b-4c2b-9a55-2a7f1c2d9e10","eventTitle":"Sync","datetime":"2026-05-01T09:30:00+03:00","userId":5}"#;
        let n: Notification = serde_json::from_str(payload).unwrap();
        assert_eq!(n.user_id, 5);
        assert_eq!(n.datetime, Utc.with_ymd_and_hms(2026, 5, 1, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_display() {
        let n = sample();
        let text = n.to_string();
        assert!(text.starts_with("New notification from event "));
        assert!(text.contains("Board meeting to user with ID 42 2026-05-01 09:30:00"));
    }
}
