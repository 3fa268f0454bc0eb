//! # calnotify sender
//! Consumes notifications from the queue, acknowledges them, and marks the
//! originating events as notified.

pub mod sender;

pub use sender::{Sender, SenderMetrics, SenderSnapshot};
