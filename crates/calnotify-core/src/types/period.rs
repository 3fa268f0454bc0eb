//! Query windows and retention rules over event time ranges.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use super::Event;

/// Window size selector for `List` queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Exclusive end of the window that starts at `from`.
    pub fn window_end(self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Day => from + Duration::days(1),
            Granularity::Week => from + Duration::days(7),
            Granularity::Month => from
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Unrecognised selectors fall back to a one-day window.
impl From<&str> for Granularity {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" => Granularity::Week,
            "month" => Granularity::Month,
            _ => Granularity::Day,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

/// Which side of the retention threshold gets purged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Purge events that ended before the threshold.
    #[default]
    ExpiredBefore,
    /// Purge events that ended after the threshold. Reproduces the legacy
    /// calendar service, which removed nearly everything on each sweep.
    EndedAfter,
}

/// Retention rule applied by the purge sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    #[serde(default)]
    pub policy: RetentionPolicy,
    #[serde(default = "default_retention_months")]
    pub months: u32,
}

fn default_retention_months() -> u32 { 12 }

impl Default for Retention {
    fn default() -> Self {
        Self {
            policy: RetentionPolicy::default(),
            months: default_retention_months(),
        }
    }
}

impl Retention {
    pub fn new(policy: RetentionPolicy, months: u32) -> Self {
        Self { policy, months }
    }

    /// `now` minus the retention period.
    pub fn threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn should_purge(&self, event: &Event, threshold: DateTime<Utc>) -> bool {
        match self.policy {
            RetentionPolicy::ExpiredBefore => event.end_date < threshold,
            RetentionPolicy::EndedAfter => event.end_date > threshold,
        }
    }
}
