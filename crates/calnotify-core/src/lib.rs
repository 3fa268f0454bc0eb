//! # calnotify core
//!
//! Shared types, traits, configuration, and errors for the calendar
//! notification services.
//!
//! ```text
//! Calendar facade ──► EventStore ◄── Scheduler ──► MessageQueue ──► Sender
//!                         ▲                                           │
//!                         └──────────── mark_notified ◄───────────────┘
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::CalNotifyConfig;
pub use error::{CalNotifyError, Result};
