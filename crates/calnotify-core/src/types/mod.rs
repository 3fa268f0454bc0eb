//! Shared domain types.

pub mod event;
pub mod notification;
pub mod period;

pub use event::Event;
pub use notification::Notification;
pub use period::{Granularity, Retention, RetentionPolicy};
